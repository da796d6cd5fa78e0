// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Length-prefixed framing of [Envelope]s. A frame is the big-endian `u64`
//! payload length followed by the bincode encoded envelope.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::CodecErr;
use crate::protocol::Envelope;

const LENGTH_PREFIX: usize = std::mem::size_of::<u64>();

/// Encode an envelope into a single frame
pub fn encode(envelope: &Envelope) -> Result<Bytes, CodecErr> {
    let payload = bincode::serialize(envelope)?;
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX + payload.len());
    frame.put_u64(payload.len() as u64);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Decode one frame back into its envelope
pub fn decode(mut frame: &[u8]) -> Result<Envelope, CodecErr> {
    if frame.len() < LENGTH_PREFIX {
        return Err(CodecErr::Truncated);
    }
    let len = frame.get_u64() as usize;
    if frame.len() < len {
        return Err(CodecErr::Truncated);
    }
    Ok(bincode::deserialize(&frame[..len])?)
}

#[cfg(test)]
mod tests {
    use super::{decode, encode};
    use crate::errors::CodecErr;
    use crate::info::{AppInfo, Requirements};
    use crate::protocol::{Envelope, Request, RoleBody, RoleMessage};
    use crate::{OverlayId, RoleId};

    #[test]
    fn test_frame_carries_its_length() {
        let envelope = Envelope::ShutdownNode;
        let frame = encode(&envelope).expect("Failed to encode");
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&frame[..8]);
        assert_eq!(frame.len() - 8, u64::from_be_bytes(prefix) as usize);
        assert_eq!(envelope, decode(&frame).expect("Failed to decode"));
    }

    #[test]
    fn test_role_request_survives_the_wire() {
        let ensemble = OverlayId::derive("demo");
        let envelope = Envelope::Request {
            from: OverlayId(1),
            correlation: OverlayId::random(),
            body: Request::Role(RoleMessage {
                from: RoleId::new(ensemble, OverlayId(1)),
                to: RoleId::new(ensemble, OverlayId(2)),
                body: RoleBody::DeployApp {
                    app: AppInfo::new("demo", Requirements::default()),
                    code: vec![1, 2, 3],
                },
            }),
        };
        let frame = encode(&envelope).expect("Failed to encode");
        assert_eq!(envelope, decode(&frame).expect("Failed to decode"));
    }

    #[test]
    fn test_truncated_frames_are_rejected() {
        let frame = encode(&Envelope::Gossip { known: vec![] }).expect("Failed to encode");
        assert!(matches!(decode(&frame[..4]), Err(CodecErr::Truncated)));
        assert!(matches!(
            decode(&frame[..frame.len() - 1]),
            Err(CodecErr::Truncated)
        ));
    }
}
