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


//! Error types for registry operations

use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Registry error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The message failed validation and cannot change client state
    #[error("Invalid message '{raw}': {reason}")]
    InvalidMessage {
        /// The raw payload
        raw: String,
        /// Why it was rejected
        reason: String,
    },
}
