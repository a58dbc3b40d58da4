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

use crate::error::DexOAuth2Error;
use async_trait::async_trait;
use std::sync::Arc;
use testcontainers_dex::{Client, RunningDexContainer};
use tokio::sync::Mutex;
use tracing::info;
use url::Url;

pub const DEFAULT_REGISTRATION_NAME: &str = "dex";

/// What an application under test needs to act as an OAuth2 client of a Dex container.
#[async_trait]
pub trait DexConnectionDetails: Send + Sync {
    /// Registration id of the client in the application's OAuth2 configuration.
    fn registration_name(&self) -> &str {
        DEFAULT_REGISTRATION_NAME
    }

    async fn issuer_uri(&self) -> String;

    fn client_id(&self) -> &str;

    fn client_secret(&self) -> &str;

    /// Registers [`Self::client_id`] and [`Self::client_secret`] with Dex, with the redirect URI
    /// `http://localhost:<port>/login/oauth2/code/<registration name>`.
    async fn register_client(&self, port: u16) -> Result<(), DexOAuth2Error>;
}

/// Connection details of a container shared with the test that started it.
#[derive(Clone, Debug)]
pub struct ContainerConnectionDetails {
    container: Arc<Mutex<RunningDexContainer>>,
    registration_name: String,
    client_id: String,
    client_secret: String,
}

impl ContainerConnectionDetails {
    pub const DEFAULT_CLIENT_ID: &'static str = "oauth2-client";
    pub const DEFAULT_CLIENT_SECRET: &'static str = "oauth2-client-secret";

    pub fn new(container: Arc<Mutex<RunningDexContainer>>) -> Self {
        Self {
            container,
            registration_name: DEFAULT_REGISTRATION_NAME.to_string(),
            client_id: Self::DEFAULT_CLIENT_ID.to_string(),
            client_secret: Self::DEFAULT_CLIENT_SECRET.to_string(),
        }
    }

    pub fn with_registration_name(mut self, registration_name: impl Into<String>) -> Self {
        self.registration_name = registration_name.into();
        self
    }

    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn container(&self) -> &Arc<Mutex<RunningDexContainer>> {
        &self.container
    }
}

#[async_trait]
impl DexConnectionDetails for ContainerConnectionDetails {
    fn registration_name(&self) -> &str {
        &self.registration_name
    }

    async fn issuer_uri(&self) -> String {
        self.container.lock().await.issuer_uri().to_string()
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn client_secret(&self) -> &str {
        &self.client_secret
    }

    async fn register_client(&self, port: u16) -> Result<(), DexOAuth2Error> {
        let redirect_uri = redirect_uri(port, &self.registration_name)?;
        let client = Client::new(&self.client_id, &self.client_secret, redirect_uri.clone())?;

        self.container.lock().await.add_client(client).await?;
        info!(
            client_id = %self.client_id,
            redirect_uri = %redirect_uri,
            "Registered the application with Dex"
        );
        Ok(())
    }
}

/// `http://localhost:<port>/login/oauth2/code/<registration name>`, with the port always
/// spelled out, 80 included.
pub fn redirect_uri(port: u16, registration_name: &str) -> Result<String, DexOAuth2Error> {
    // only used to percent-encode the path
    let mut url = Url::parse("http://localhost").map_err(|err| DexOAuth2Error::InvalidUrl {
        url: "http://localhost".to_string(),
        reason: err.to_string(),
    })?;
    url.path_segments_mut()
        .map_err(|_| DexOAuth2Error::InvalidUrl {
            url: "http://localhost".to_string(),
            reason: "cannot be a base".to_string(),
        })?
        .clear()
        .extend(["login", "oauth2", "code", registration_name]);
    Ok(format!("http://localhost:{port}{}", url.path()))
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::redirect_uri;
    use pretty_assertions::assert_eq;

    #[test]
    fn redirect_uri_points_at_the_login_callback() {
        let uri = redirect_uri(8080, "dex").unwrap();

        assert_eq!(uri, "http://localhost:8080/login/oauth2/code/dex");
    }

    #[test]
    fn redirect_uri_keeps_the_default_http_port() {
        let uri = redirect_uri(80, "dex").unwrap();

        assert_eq!(uri, "http://localhost:80/login/oauth2/code/dex");
    }

    #[test]
    fn redirect_uri_encodes_the_registration_name() {
        let uri = redirect_uri(34567, "my dex").unwrap();

        assert_eq!(
            uri,
            "http://localhost:34567/login/oauth2/code/my%20dex"
        );
    }
}
