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


use std::fmt;

/// Discrete status reported by an agent.
///
/// `Unknown` is the initial state of every tracked source and the status carried by messages
/// that failed validation. It is never produced by a successful parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusCode {
    /// Agent reports a fault
    Error,
    /// Agent is running as a standby unit
    Secondary,
    /// Agent is running as the active unit
    Primary,
    /// No data has been received yet
    #[default]
    Unknown,
}

impl StatusCode {
    /// Every status, in wire digit order followed by `Unknown`.
    pub const ALL: [StatusCode; 4] = [
        StatusCode::Error,
        StatusCode::Secondary,
        StatusCode::Primary,
        StatusCode::Unknown,
    ];

    /// Map a wire digit to a status. Returns `None` for anything outside `0..=2`.
    pub fn from_digit(digit: char) -> Option<StatusCode> {
        match digit {
            '0' => Some(StatusCode::Error),
            '1' => Some(StatusCode::Secondary),
            '2' => Some(StatusCode::Primary),
            _ => None,
        }
    }

    /// The wire digit for this status, `None` for `Unknown`.
    pub fn digit(self) -> Option<char> {
        match self {
            StatusCode::Error => Some('0'),
            StatusCode::Secondary => Some('1'),
            StatusCode::Primary => Some('2'),
            StatusCode::Unknown => None,
        }
    }

    /// Whether this status can appear on the wire.
    pub fn is_reportable(self) -> bool {
        self.digit().is_some()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Error => write!(f, "error"),
            StatusCode::Secondary => write!(f, "secondary"),
            StatusCode::Primary => write!(f, "primary"),
            StatusCode::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_mapping() {
        assert_eq!(StatusCode::from_digit('0'), Some(StatusCode::Error));
        assert_eq!(StatusCode::from_digit('1'), Some(StatusCode::Secondary));
        assert_eq!(StatusCode::from_digit('2'), Some(StatusCode::Primary));
        assert_eq!(StatusCode::from_digit('3'), None);
        assert_eq!(StatusCode::from_digit('x'), None);
    }

    #[test]
    fn test_unknown_has_no_digit() {
        assert_eq!(StatusCode::Unknown.digit(), None);
        assert!(!StatusCode::Unknown.is_reportable());
        assert_eq!(StatusCode::default(), StatusCode::Unknown);
    }

    #[test]
    fn test_reportable_digits_map_back() {
        for status in StatusCode::ALL.iter().filter(|s| s.is_reportable()) {
            let digit = status.digit().unwrap();
            assert_eq!(StatusCode::from_digit(digit), Some(*status));
        }
    }
}
