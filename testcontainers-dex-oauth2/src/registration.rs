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
use indexmap::IndexMap;
use openidconnect::core::{CoreClient, CoreProviderMetadata};
use openidconnect::reqwest::async_http_client;
use openidconnect::{ClientId, ClientSecret, IssuerUrl, RedirectUrl};
use tracing::debug;

pub const DEFAULT_SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Endpoints of the OpenID provider, as discovered from its issuer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDetails {
    pub issuer_uri: String,
    pub authorization_uri: String,
    pub token_uri: String,
    pub jwk_set_uri: String,
    pub user_info_uri: Option<String>,
}

/// An OAuth2 client registration of the application under test.
#[derive(Clone, Debug)]
pub struct ClientRegistration {
    registration_id: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    provider: ProviderDetails,
    metadata: CoreProviderMetadata,
}

impl ClientRegistration {
    /// Discovers the provider at `issuer_uri` and builds a registration with the default scopes.
    pub async fn from_issuer_location(
        registration_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        issuer_uri: &str,
    ) -> Result<Self, DexOAuth2Error> {
        let issuer_url =
            IssuerUrl::new(issuer_uri.to_string()).map_err(|err| DexOAuth2Error::InvalidUrl {
                url: issuer_uri.to_string(),
                reason: err.to_string(),
            })?;
        let metadata = CoreProviderMetadata::discover_async(issuer_url, async_http_client)
            .await
            .map_err(|err| DexOAuth2Error::Discovery {
                issuer_uri: issuer_uri.to_string(),
                reason: err.to_string(),
            })?;
        debug!(issuer_uri, "Discovered provider metadata");

        Self::from_provider_metadata(registration_id, client_id, client_secret, metadata)
    }

    pub fn from_provider_metadata(
        registration_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        metadata: CoreProviderMetadata,
    ) -> Result<Self, DexOAuth2Error> {
        let issuer_uri = metadata.issuer().url().to_string();
        let token_uri = metadata
            .token_endpoint()
            .ok_or_else(|| DexOAuth2Error::MissingTokenEndpoint(issuer_uri.clone()))?
            .url()
            .to_string();
        let provider = ProviderDetails {
            authorization_uri: metadata.authorization_endpoint().url().to_string(),
            token_uri,
            jwk_set_uri: metadata.jwks_uri().url().to_string(),
            user_info_uri: metadata
                .userinfo_endpoint()
                .map(|endpoint| endpoint.url().to_string()),
            issuer_uri,
        };

        Ok(Self {
            registration_id: registration_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            provider,
            metadata,
        })
    }

    pub fn registration_id(&self) -> &str {
        &self.registration_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn provider(&self) -> &ProviderDetails {
        &self.provider
    }

    pub fn metadata(&self) -> &CoreProviderMetadata {
        &self.metadata
    }

    /// An OpenID Connect client authenticating with `client_secret_basic`.
    pub fn oidc_client(&self, redirect_uri: &str) -> Result<CoreClient, DexOAuth2Error> {
        let redirect_url =
            RedirectUrl::new(redirect_uri.to_string()).map_err(|err| DexOAuth2Error::InvalidUrl {
                url: redirect_uri.to_string(),
                reason: err.to_string(),
            })?;

        Ok(CoreClient::from_provider_metadata(
            self.metadata.clone(),
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
        )
        .set_redirect_uri(redirect_url))
    }

    /// Environment variables configuring this registration for an application that reads its
    /// settings with `Env::prefixed("<prefix>__").split("__")`.
    ///
    /// ```text
    /// <PREFIX>__REGISTRATION__<ID>__CLIENT_ID
    /// <PREFIX>__REGISTRATION__<ID>__CLIENT_SECRET
    /// <PREFIX>__REGISTRATION__<ID>__SCOPE
    /// <PREFIX>__PROVIDER__<ID>__ISSUER_URI
    /// ```
    pub fn to_env(&self, prefix: &str) -> Vec<(String, String)> {
        let prefix = env_key(prefix);
        let id = env_key(&self.registration_id);
        vec![
            (
                format!("{prefix}__REGISTRATION__{id}__CLIENT_ID"),
                self.client_id.clone(),
            ),
            (
                format!("{prefix}__REGISTRATION__{id}__CLIENT_SECRET"),
                self.client_secret.clone(),
            ),
            (
                format!("{prefix}__REGISTRATION__{id}__SCOPE"),
                self.scopes.join(","),
            ),
            (
                format!("{prefix}__PROVIDER__{id}__ISSUER_URI"),
                self.provider.issuer_uri.clone(),
            ),
        ]
    }
}

fn env_key(value: &str) -> String {
    value.to_uppercase().replace(['-', '.', ' '], "_")
}

/// Client registrations keyed by registration id.
#[derive(Clone, Debug, Default)]
pub struct ClientRegistrationRepository {
    registrations: IndexMap<String, ClientRegistration>,
}

impl ClientRegistrationRepository {
    pub fn new(registrations: impl IntoIterator<Item = ClientRegistration>) -> Self {
        Self {
            registrations: registrations
                .into_iter()
                .map(|registration| (registration.registration_id.clone(), registration))
                .collect(),
        }
    }

    pub fn find_by_registration_id(&self, registration_id: &str) -> Option<&ClientRegistration> {
        self.registrations.get(registration_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientRegistration> {
        self.registrations.values()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
