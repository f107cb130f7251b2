use serde::{Deserialize, Serialize};

use crate::Error;

/// Upper bound for one encoded sample. Two `u16` values plus keys fit in 34
/// bytes, the rest is headroom.
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Identifier of an ADC input as understood by the board's [`AnalogSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    Timeout,
    InvalidData,
    UnknownChannel(ChannelId),
}

/// Raw integer readings from the board's analog inputs.
pub trait AnalogSource {
    fn read(&mut self, channel: ChannelId) -> impl Future<Output = Result<u16, SensorError>>;
}

/// One reading of the two monitored channels.
///
/// Field order is part of the wire format: `{"analog":512,"hall_mT":2048}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Channel 0 reading.
    pub analog: u16,
    /// Raw hall-effect channel reading. The key keeps its historical name even
    /// though the value is an ADC count, not millitesla.
    #[serde(rename = "hall_mT")]
    pub hall_mt: u16,
}

impl Sample {
    /// Read `analog` first, then `hall`.
    pub async fn acquire<A: AnalogSource>(
        source: &mut A,
        analog: ChannelId,
        hall: ChannelId,
    ) -> Result<Self, SensorError> {
        let analog = source.read(analog).await?;
        let hall_mt = source.read(hall).await?;

        Ok(Self { analog, hall_mt })
    }

    /// Render the sample as compact JSON into `buf`.
    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b str, Error> {
        let used = serde_json_core::to_slice(self, buf).map_err(|_| Error::SerializationFailed)?;

        core::str::from_utf8(&buf[..used]).map_err(|_| Error::SerializationFailed)
    }

    pub fn decode(text: &str) -> Result<Self, Error> {
        let (sample, _) =
            serde_json_core::from_str::<Sample>(text).map_err(|_| Error::DeserializationFailed)?;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_exact_wire_text() {
        let mut buf = [0u8; MAX_PAYLOAD_SIZE];
        let sample = Sample {
            analog: 512,
            hall_mt: 2048,
        };

        assert_eq!(
            sample.encode(&mut buf).unwrap(),
            r#"{"analog":512,"hall_mT":2048}"#
        );
    }

    #[test]
    fn extremes_survive_the_wire() {
        for (analog, hall_mt) in [(0, 0), (4095, 4095), (u16::MAX, 1), (300, 150)] {
            let mut buf = [0u8; MAX_PAYLOAD_SIZE];
            let sample = Sample { analog, hall_mt };
            let text = sample.encode(&mut buf).unwrap();

            assert_eq!(text, format!(r#"{{"analog":{analog},"hall_mT":{hall_mt}}}"#));
            assert_eq!(Sample::decode(text).unwrap(), sample);
        }
    }

    #[test]
    fn decode_accepts_whitespace_and_rejects_garbage() {
        let sample = Sample::decode(r#"{ "hall_mT": 7, "analog": 3 }"#).unwrap();
        assert_eq!(
            sample,
            Sample {
                analog: 3,
                hall_mt: 7
            }
        );

        assert_eq!(
            Sample::decode(r#"{"analog":1}"#),
            Err(Error::DeserializationFailed)
        );
        assert_eq!(Sample::decode("hello"), Err(Error::DeserializationFailed));
    }

    #[test]
    fn encode_reports_short_buffer() {
        let mut buf = [0u8; 8];
        let sample = Sample {
            analog: 1,
            hall_mt: 2,
        };

        assert_eq!(sample.encode(&mut buf), Err(Error::SerializationFailed));
    }
}
