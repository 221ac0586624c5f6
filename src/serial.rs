//! Certificate serial numbers.
//!
//! Serials must be unique within the issuing CA's history. Two sources are offered:
//!
//! - [`SerialSource::Random`]: 128 bits from OpenSSL's CSPRNG. Collisions are negligible and no
//!   state is shared between issuances, so this is the default.
//! - [`SerialSource::Clock`]: nanoseconds since the Unix epoch, pushed through a process-wide
//!   high-water mark so that every serial handed out is strictly greater than the previous one,
//!   including across threads. Useful when serials should sort by issuance time.

use crate::error::{crypto, IssueError, Result};
use openssl::asn1::Asn1Integer;
use openssl::bn::{BigNum, MsbOption};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const RANDOM_SERIAL_BITS: i32 = 128;

static CLOCK_HIGH_WATER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialSource {
    #[default]
    Random,
    Clock,
}

impl SerialSource {
    /// Draw the next serial number.
    pub fn next_serial(&self) -> Result<BigNum> {
        match self {
            SerialSource::Random => {
                let mut serial = BigNum::new().map_err(crypto("Failed to allocate serial"))?;
                serial
                    .rand(RANDOM_SERIAL_BITS, MsbOption::MAYBE_ZERO, false)
                    .map_err(crypto("Failed to generate random serial"))?;
                Ok(serial)
            }
            SerialSource::Clock => {
                let value = next_clock_value()?;
                BigNum::from_slice(&value.to_be_bytes())
                    .map_err(crypto("Failed to encode clock serial"))
            }
        }
    }

    /// Draw the next serial number as an ASN.1 INTEGER ready for a certificate builder.
    pub fn next_asn1(&self) -> Result<Asn1Integer> {
        self.next_serial()?
            .to_asn1_integer()
            .map_err(crypto("Failed to convert serial to ASN.1"))
    }
}

fn next_clock_value() -> Result<u64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| IssueError::CryptoError(format!("System clock before Unix epoch: {}", e)))?;
    let now = u64::try_from(now.as_nanos()).unwrap_or(u64::MAX);

    let mut previous = CLOCK_HIGH_WATER.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(previous.saturating_add(1));
        match CLOCK_HIGH_WATER.compare_exchange_weak(
            previous,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return Ok(candidate),
            Err(actual) => previous = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_serials_differ() {
        let a = SerialSource::Random.next_serial().unwrap();
        let b = SerialSource::Random.next_serial().unwrap();
        assert_ne!(a.to_vec(), b.to_vec());
        assert!(a.num_bits() <= RANDOM_SERIAL_BITS);
    }

    #[test]
    fn test_clock_serials_strictly_increase() {
        let mut last = SerialSource::Clock.next_serial().unwrap();
        for _ in 0..1000 {
            let next = SerialSource::Clock.next_serial().unwrap();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_clock_serials_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..500)
                        .map(|_| next_clock_value().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "duplicate clock serial {}", value);
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }

    #[test]
    fn test_clock_serial_tracks_wall_clock() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        let value = next_clock_value().unwrap();
        assert!(value >= before);
    }

    #[test]
    fn test_asn1_conversion() {
        assert!(SerialSource::Random.next_asn1().is_ok());
        assert!(SerialSource::Clock.next_asn1().is_ok());
    }
}
