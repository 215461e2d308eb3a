//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Payload grammar: `^(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})_state(\d)$`

use crate::{Heartbeat, ParseError, SourceId, StatusCode};
use std::net::Ipv4Addr;

/// Separator between the address and the state digit.
pub const STATE_MARKER: &str = "_state";

/// Parse a frame payload into a [`Heartbeat`].
///
/// Parsing is pure: it never panics and has no side effects. Leading zeros inside an octet
/// are accepted (`010` is ten) as long as the octet has at most three digits.
///
/// # Example
/// ```
/// use heartwire_codec::{parse_payload, StatusCode};
///
/// let heartbeat = parse_payload("10.0.0.5_state2").unwrap();
/// assert_eq!(heartbeat.source().to_string(), "10.0.0.5");
/// assert_eq!(heartbeat.status(), StatusCode::Primary);
///
/// assert!(parse_payload("10.0.0.5_state9").is_err());
/// ```
pub fn parse_payload(payload: &str) -> Result<Heartbeat, ParseError> {
    if payload.is_empty() {
        return Err(ParseError::Empty);
    }

    let (address, state) = payload
        .rsplit_once(STATE_MARKER)
        .ok_or(ParseError::MissingMarker)?;

    let source = parse_address(address)?;
    let status = parse_state(state)?;

    Ok(Heartbeat::new(source, status))
}

fn parse_address(address: &str) -> Result<SourceId, ParseError> {
    let parts: Vec<&str> = address.split('.').collect();
    if parts.len() != 4 {
        return Err(ParseError::InvalidAddress {
            reason: format!("expected 4 octets, found {}", parts.len()),
        });
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(parts) {
        *slot = parse_octet(part)?;
    }

    Ok(SourceId::new(Ipv4Addr::from(octets)))
}

fn parse_octet(part: &str) -> Result<u8, ParseError> {
    if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidAddress {
            reason: format!("'{}' is not a 1-3 digit octet", part),
        });
    }

    // At most three ASCII digits, so this cannot overflow a u16.
    let value = part
        .bytes()
        .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));

    u8::try_from(value).map_err(|_| ParseError::OctetOutOfRange {
        octet: part.to_string(),
    })
}

fn parse_state(state: &str) -> Result<StatusCode, ParseError> {
    let mut chars = state.chars();
    let digit = match (chars.next(), chars.next()) {
        (None, _) => return Err(ParseError::MissingState),
        (Some(c), None) if c.is_ascii_digit() => c,
        _ => {
            return Err(ParseError::InvalidState {
                found: state.to_string(),
            });
        }
    };

    StatusCode::from_digit(digit).ok_or(ParseError::UnknownState { digit })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_payloads() {
        let hb = parse_payload("10.0.0.5_state0").unwrap();
        assert_eq!(hb.source(), SourceId::from([10, 0, 0, 5]));
        assert_eq!(hb.status(), StatusCode::Error);

        let hb = parse_payload("192.168.1.254_state1").unwrap();
        assert_eq!(hb.status(), StatusCode::Secondary);

        let hb = parse_payload("255.255.255.255_state2").unwrap();
        assert_eq!(hb.source(), SourceId::from([255, 255, 255, 255]));
        assert_eq!(hb.status(), StatusCode::Primary);
    }

    #[test]
    fn test_parse_leading_zero_octets() {
        let hb = parse_payload("010.000.0.07_state2").unwrap();
        assert_eq!(hb.source(), SourceId::from([10, 0, 0, 7]));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_payload(""), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_missing_marker() {
        assert_eq!(parse_payload("garbage"), Err(ParseError::MissingMarker));
        assert_eq!(parse_payload("10.0.0.5-state1"), Err(ParseError::MissingMarker));
    }

    #[test]
    fn test_parse_wrong_octet_count() {
        assert!(matches!(
            parse_payload("10.0.5_state1"),
            Err(ParseError::InvalidAddress { .. })
        ));
        assert!(matches!(
            parse_payload("10.0.0.0.5_state1"),
            Err(ParseError::InvalidAddress { .. })
        ));
        assert!(matches!(
            parse_payload("_state1"),
            Err(ParseError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_parse_malformed_octets() {
        assert!(matches!(
            parse_payload("10.0..5_state1"),
            Err(ParseError::InvalidAddress { .. })
        ));
        assert!(matches!(
            parse_payload("10.0.a.5_state1"),
            Err(ParseError::InvalidAddress { .. })
        ));
        assert!(matches!(
            parse_payload("10.0.0.1000_state1"),
            Err(ParseError::InvalidAddress { .. })
        ));
        assert!(matches!(
            parse_payload("10.0.-1.5_state1"),
            Err(ParseError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_parse_octet_out_of_range() {
        assert_eq!(
            parse_payload("10.0.0.256_state1"),
            Err(ParseError::OctetOutOfRange {
                octet: "256".to_string()
            })
        );
        assert_eq!(
            parse_payload("999.0.0.1_state1"),
            Err(ParseError::OctetOutOfRange {
                octet: "999".to_string()
            })
        );
    }

    #[test]
    fn test_parse_bad_state() {
        assert_eq!(parse_payload("10.0.0.5_state"), Err(ParseError::MissingState));
        assert_eq!(
            parse_payload("10.0.0.5_state3"),
            Err(ParseError::UnknownState { digit: '3' })
        );
        assert_eq!(
            parse_payload("10.0.0.5_state9"),
            Err(ParseError::UnknownState { digit: '9' })
        );
        assert!(matches!(
            parse_payload("10.0.0.5_statex"),
            Err(ParseError::InvalidState { .. })
        ));
        assert!(matches!(
            parse_payload("10.0.0.5_state12"),
            Err(ParseError::InvalidState { .. })
        ));
        assert!(matches!(
            parse_payload("10.0.0.5_state1 "),
            Err(ParseError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_surrounding_whitespace() {
        assert!(parse_payload(" 10.0.0.5_state1").is_err());
        assert!(parse_payload("10.0.0.5_state1\r").is_err());
    }
}
