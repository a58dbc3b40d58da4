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

use std::time::Duration;
use testcontainers::TestcontainersError;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error("failed to hash password: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}

#[derive(Debug, thiserror::Error)]
pub enum DexApiError {
    #[error("invalid gRPC endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("failed to connect to the Dex gRPC API: {0}")]
    Connect(#[from] tonic::transport::Error),
    #[error("{call} failed: {status}")]
    Status {
        call: &'static str,
        status: Box<tonic::Status>,
    },
    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },
}

impl DexApiError {
    pub fn status(call: &'static str, status: tonic::Status) -> Self {
        Self::Status {
            call,
            status: Box::new(status),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DexError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] DexApiError),
    #[error("container error: {0}")]
    Container(#[from] TestcontainersError),
    #[error("could not write config file in container (exit code {exit_code}): {stderr}")]
    ConfigWrite {
        exit_code: i64,
        stderr: String,
    },
    #[error("command in the container did not exit within {0:?}")]
    ExecTimeout(Duration),
    #[error("could not render the Dex configuration: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error("Dex did not serve its OpenID configuration within {0:?}")]
    StartupTimeout(Duration),
    #[error("HTTP request to Dex failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for DexError {
    fn from(value: figment::Error) -> Self {
        Self::Config(Box::new(value))
    }
}
