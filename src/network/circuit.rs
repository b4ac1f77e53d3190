use crate::core::error::CircuitDecodeError;
use uuid::Uuid;

/// Circuit establishment packet sent by a client once its login succeeded.
///
/// Layout: big-endian `u32` circuit code, then the session id and the agent
/// id as UTF-8 strings, each preceded by a big-endian `u16` byte length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UseCircuitCode {
    pub circuit_code: u32,
    pub session_id: Uuid,
    pub agent_id: Uuid,
}

impl UseCircuitCode {
    pub fn encode(&self) -> Vec<u8> {
        let session = self.session_id.to_string();
        let agent = self.agent_id.to_string();

        let mut buf = Vec::with_capacity(4 + 2 + session.len() + 2 + agent.len());
        buf.extend_from_slice(&self.circuit_code.to_be_bytes());
        write_string(&mut buf, &session);
        write_string(&mut buf, &agent);
        buf
    }

    /// Decode a packet. Bytes after the agent id are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, CircuitDecodeError> {
        let mut reader = Reader { data, pos: 0 };

        let code = reader.take(4, "CircuitCode")?;
        let circuit_code = u32::from_be_bytes([code[0], code[1], code[2], code[3]]);
        let session_id = reader.uuid("SessionID")?;
        let agent_id = reader.uuid("AgentID")?;

        Ok(Self {
            circuit_code,
            session_id,
            agent_id,
        })
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    // Hyphenated UUIDs are 36 bytes, far below the u16 prefix limit
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], CircuitDecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CircuitDecodeError::Truncated { field })?;

        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn string(&mut self, field: &'static str) -> Result<&'a str, CircuitDecodeError> {
        let prefix = self.take(2, field)?;
        let len = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
        let bytes = self.take(len, field)?;
        std::str::from_utf8(bytes).map_err(|_| CircuitDecodeError::InvalidUtf8 { field })
    }

    fn uuid(&mut self, field: &'static str) -> Result<Uuid, CircuitDecodeError> {
        let text = self.string(field)?;
        Uuid::parse_str(text).map_err(|_| CircuitDecodeError::InvalidUuid { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UseCircuitCode {
        UseCircuitCode {
            circuit_code: 0x0102_0304,
            session_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_encode_layout() {
        let packet = sample();
        let bytes = packet.encode();

        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..6], &[0, 36]);
        assert_eq!(&bytes[6..42], packet.session_id.to_string().as_bytes());
        assert_eq!(&bytes[42..44], &[0, 36]);
        assert_eq!(&bytes[44..80], packet.agent_id.to_string().as_bytes());
        assert_eq!(bytes.len(), 80);
    }

    #[test]
    fn test_decode_encoded_packet() {
        let packet = sample();
        assert_eq!(UseCircuitCode::decode(&packet.encode()), Ok(packet));
    }

    #[test]
    fn test_decode_truncated_mid_session_id() {
        let bytes = sample().encode();

        let result = UseCircuitCode::decode(&bytes[..20]);

        assert_eq!(
            result,
            Err(CircuitDecodeError::Truncated { field: "SessionID" })
        );
    }

    #[test]
    fn test_decode_truncated_in_each_field() {
        let bytes = sample().encode();

        assert_eq!(
            UseCircuitCode::decode(&bytes[..3]),
            Err(CircuitDecodeError::Truncated { field: "CircuitCode" })
        );
        assert_eq!(
            UseCircuitCode::decode(&bytes[..5]),
            Err(CircuitDecodeError::Truncated { field: "SessionID" })
        );
        assert_eq!(
            UseCircuitCode::decode(&bytes[..43]),
            Err(CircuitDecodeError::Truncated { field: "AgentID" })
        );
        assert_eq!(
            UseCircuitCode::decode(&bytes[..79]),
            Err(CircuitDecodeError::Truncated { field: "AgentID" })
        );
        assert!(UseCircuitCode::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_uuid() {
        let mut bytes = vec![0, 0, 0, 7];
        write_string(&mut bytes, "not-a-uuid");
        write_string(&mut bytes, &Uuid::new_v4().to_string());

        assert_eq!(
            UseCircuitCode::decode(&bytes),
            Err(CircuitDecodeError::InvalidUuid { field: "SessionID" })
        );
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let mut bytes = vec![0, 0, 0, 7];
        bytes.extend_from_slice(&[0, 2, 0xff, 0xfe]);

        assert_eq!(
            UseCircuitCode::decode(&bytes),
            Err(CircuitDecodeError::InvalidUtf8 { field: "SessionID" })
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let packet = sample();
        let mut bytes = packet.encode();
        bytes.extend_from_slice(b"extra");

        assert_eq!(UseCircuitCode::decode(&bytes), Ok(packet));
    }
}
