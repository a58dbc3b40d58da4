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

use crate::error::DexApiError;
use crate::model::{Client, User};
use async_trait::async_trait;
use dex_api_grpc::proto::api;
use dex_api_grpc::proto::api::dex_client::DexClient;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// The subset of Dex's admin API needed to keep clients and users in sync with a running
/// container.
#[async_trait]
pub trait DexApi: Send + Sync {
    async fn version(&self) -> Result<DexVersion, DexApiError>;

    async fn create_client(&self, client: &Client) -> Result<(), DexApiError>;

    /// Returns `false` if there was no such client.
    async fn delete_client(&self, client_id: &str) -> Result<bool, DexApiError>;

    async fn create_password(&self, user: &User) -> Result<(), DexApiError>;

    /// Returns `false` if there was no password for this email.
    async fn delete_password(&self, email: &str) -> Result<bool, DexApiError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DexVersion {
    pub server: String,
    pub api: i32,
}

#[derive(Clone)]
pub struct DexGrpcApi {
    client: DexClient<Channel>,
}

impl DexGrpcApi {
    const CONNECT_RETRIES: u32 = 20;
    const CONNECT_BACKOFF: Duration = Duration::from_millis(250);

    /// Opens a plaintext channel to `host:port`. Dex may open its gRPC listener shortly after its
    /// HTTP listener, so failed attempts are retried.
    pub async fn connect(host: &str, port: u16) -> Result<Self, DexApiError> {
        let uri = format!("http://{host}:{port}");
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|err| DexApiError::InvalidEndpoint {
                endpoint: uri.clone(),
                reason: err.to_string(),
            })?
            .connect_timeout(Duration::from_secs(1));

        let channel = tryhard::retry_fn(|| endpoint.connect())
            .retries(Self::CONNECT_RETRIES)
            .fixed_backoff(Self::CONNECT_BACKOFF)
            .await?;

        debug!(endpoint = %uri, "Connected to the Dex gRPC API");
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            client: DexClient::new(channel),
        }
    }
}

#[async_trait]
impl DexApi for DexGrpcApi {
    async fn version(&self) -> Result<DexVersion, DexApiError> {
        let response = self
            .client
            .clone()
            .get_version(api::VersionReq {})
            .await
            .map_err(|status| DexApiError::status("GetVersion", status))?
            .into_inner();

        Ok(DexVersion {
            server: response.server,
            api: response.api,
        })
    }

    async fn create_client(&self, client: &Client) -> Result<(), DexApiError> {
        let request = api::CreateClientReq {
            client: Some(api::Client::confidential(
                client.client_id(),
                client.client_secret(),
                client.redirect_uri(),
            )),
        };
        let response = self
            .client
            .clone()
            .create_client(request)
            .await
            .map_err(|status| DexApiError::status("CreateClient", status))?
            .into_inner();

        if response.already_exists {
            return Err(DexApiError::AlreadyExists {
                kind: "client",
                id: client.client_id().to_string(),
            });
        }
        debug!(client_id = client.client_id(), "Created client");
        Ok(())
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool, DexApiError> {
        let response = self
            .client
            .clone()
            .delete_client(api::DeleteClientReq {
                id: client_id.to_string(),
            })
            .await
            .map_err(|status| DexApiError::status("DeleteClient", status))?
            .into_inner();

        debug!(client_id, not_found = response.not_found, "Deleted client");
        Ok(!response.not_found)
    }

    async fn create_password(&self, user: &User) -> Result<(), DexApiError> {
        let request = api::CreatePasswordReq {
            password: Some(api::Password {
                email: user.email().to_string(),
                hash: user.bcrypt_password().as_bytes().to_vec(),
                username: user.username().to_string(),
                user_id: user.user_id().to_string(),
            }),
        };
        let response = self
            .client
            .clone()
            .create_password(request)
            .await
            .map_err(|status| DexApiError::status("CreatePassword", status))?
            .into_inner();

        if response.already_exists {
            return Err(DexApiError::AlreadyExists {
                kind: "password",
                id: user.email().to_string(),
            });
        }
        debug!(email = user.email(), "Created password");
        Ok(())
    }

    async fn delete_password(&self, email: &str) -> Result<bool, DexApiError> {
        let response = self
            .client
            .clone()
            .delete_password(api::DeletePasswordReq {
                email: email.to_string(),
            })
            .await
            .map_err(|status| DexApiError::status("DeletePassword", status))?
            .into_inner();

        debug!(email, not_found = response.not_found, "Deleted password");
        Ok(!response.not_found)
    }
}
