// Copyright 2024 Golem Cloud
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use testcontainers_dex::{DexError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum DexOAuth2Error {
    #[error(transparent)]
    Dex(#[from] DexError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to discover provider metadata from {issuer_uri}: {reason}")]
    Discovery { issuer_uri: String, reason: String },
    #[error("provider {0} does not advertise a token endpoint")]
    MissingTokenEndpoint(String),
}
