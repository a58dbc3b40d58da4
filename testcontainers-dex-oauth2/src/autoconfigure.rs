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

use crate::details::DexConnectionDetails;
use crate::error::DexOAuth2Error;
use crate::registration::{ClientRegistration, ClientRegistrationRepository};
use tracing::{debug, info};

/// Builds the OAuth2 client setup of an application under test from [`DexConnectionDetails`].
pub struct DexAutoConfiguration<D> {
    details: D,
}

impl<D: DexConnectionDetails> DexAutoConfiguration<D> {
    pub fn new(details: D) -> Self {
        Self { details }
    }

    pub fn connection_details(&self) -> &D {
        &self.details
    }

    /// Returns `existing` untouched if the application already configured its registrations.
    /// Otherwise discovers the Dex issuer and builds a repository holding one registration.
    pub async fn client_registration_repository(
        &self,
        existing: Option<ClientRegistrationRepository>,
    ) -> Result<ClientRegistrationRepository, DexOAuth2Error> {
        if let Some(existing) = existing {
            debug!("Keeping the existing client registrations");
            return Ok(existing);
        }

        let issuer_uri = self.details.issuer_uri().await;
        let registration = ClientRegistration::from_issuer_location(
            self.details.registration_name(),
            self.details.client_id(),
            self.details.client_secret(),
            &issuer_uri,
        )
        .await?;
        info!(
            registration_id = registration.registration_id(),
            issuer_uri = %issuer_uri,
            "Configured client registration for Dex"
        );

        Ok(ClientRegistrationRepository::new([registration]))
    }

    /// Call once the application listens on `port`.
    pub async fn on_server_started(&self, port: u16) -> Result<(), DexOAuth2Error> {
        self.details.register_client(port).await
    }
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::DexAutoConfiguration;
    use crate::details::DexConnectionDetails;
    use crate::error::DexOAuth2Error;
    use crate::registration::tests::dex_metadata;
    use crate::registration::{ClientRegistration, ClientRegistrationRepository};
    use assert2::assert;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDetails {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingDetails {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DexConnectionDetails for RecordingDetails {
        async fn issuer_uri(&self) -> String {
            self.calls.lock().unwrap().push("issuer_uri".to_string());
            // nothing listens on port 1
            "http://127.0.0.1:1/dex".to_string()
        }

        fn client_id(&self) -> &str {
            "app"
        }

        fn client_secret(&self) -> &str {
            "app-secret"
        }

        async fn register_client(&self, port: u16) -> Result<(), DexOAuth2Error> {
            self.calls.lock().unwrap().push(format!("register_client:{port}"));
            Ok(())
        }
    }

    #[test]
    fn registration_name_defaults_to_dex() {
        assert!(RecordingDetails::default().registration_name() == "dex");
    }

    #[test]
    async fn existing_repository_wins() {
        let auto = DexAutoConfiguration::new(RecordingDetails::default());
        let existing = ClientRegistrationRepository::new([ClientRegistration::from_provider_metadata(
            "custom",
            "custom-client",
            "custom-secret",
            dex_metadata("http://localhost:9999/dex"),
        )
        .unwrap()]);

        let repository = auto
            .client_registration_repository(Some(existing))
            .await
            .unwrap();

        assert!(repository.find_by_registration_id("custom").is_some());
        assert!(repository.find_by_registration_id("dex").is_none());
        assert!(auto.connection_details().calls().is_empty());
    }

    #[test]
    async fn missing_repository_is_discovered_from_the_issuer() {
        let auto = DexAutoConfiguration::new(RecordingDetails::default());

        let result = auto.client_registration_repository(None).await;

        assert!(let Err(DexOAuth2Error::Discovery { .. }) = result);
        assert!(auto.connection_details().calls() == vec!["issuer_uri".to_string()]);
    }

    #[test]
    async fn server_start_registers_the_client_with_its_port() {
        let auto = DexAutoConfiguration::new(RecordingDetails::default());

        auto.on_server_started(8080).await.unwrap();

        assert!(auto.connection_details().calls() == vec!["register_client:8080".to_string()]);
    }
}
