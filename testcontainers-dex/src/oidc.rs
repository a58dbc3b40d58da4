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

use crate::model::{Client, User};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::reqwest::async_http_client;
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    RedirectUrl, Scope,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

const SCOPES: [&str; 3] = ["openid", "email", "profile"];
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to discover provider metadata: {0}")]
    Discovery(String),
    #[error("Dex did not redirect to the login page")]
    NoLoginRedirect,
    #[error("Dex did not redirect back to the app with an authorization code")]
    NoRedirectWithCode,
    #[error("Missing authorization code in the response")]
    MissingCode,
    #[error("state returned by Dex does not match the one sent")]
    StateMismatch,
    #[error("failed to exchange the authorization code for tokens: {0}")]
    TokenExchange(String),
    #[error("the token response has no id token")]
    MissingIdToken,
    #[error("id token verification failed: {0}")]
    IdToken(String),
    #[error("malformed JWT: {0}")]
    Jwt(String),
}

/// The parts of the OpenID Provider Metadata document the tests look at.
///
/// See [OpenID Connect Discovery 1.0, section 3](https://openid.net/specs/openid-connect-discovery-1_0.html#ProviderMetadata).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OpenidConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub userinfo_endpoint: Option<String>,
}

/// Fetches `<issuer>/.well-known/openid-configuration`.
pub async fn openid_configuration(issuer_uri: &str) -> Result<OpenidConfiguration, OidcError> {
    let configuration = reqwest::get(format!("{issuer_uri}/.well-known/openid-configuration"))
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(configuration)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenResponse {
    pub id_token: String,
    pub access_token: String,
    pub scopes: Vec<String>,
}

impl TokenResponse {
    /// The payload of the id token. The signature is not checked.
    pub fn id_token_claims(&self) -> Result<Map<String, Value>, OidcError> {
        jwt_claims(&self.id_token)
    }

    /// The payload of the access token, which Dex issues as a JWT. The signature is not checked.
    pub fn access_token_claims(&self) -> Result<Map<String, Value>, OidcError> {
        jwt_claims(&self.access_token)
    }
}

/// Logs `user` in through Dex's password database and runs the `authorization_code` flow for
/// `client`, with the `openid email profile` scopes.
///
/// The id token is verified (signature, issuer, audience and nonce) before it is returned.
pub async fn obtain_token(
    issuer_uri: &str,
    client: &Client,
    user: &User,
) -> Result<TokenResponse, OidcError> {
    let issuer_url = IssuerUrl::new(issuer_uri.to_string()).map_err(|err| OidcError::InvalidUrl {
        url: issuer_uri.to_string(),
        reason: err.to_string(),
    })?;
    let redirect_url =
        RedirectUrl::new(client.redirect_uri().to_string()).map_err(|err| OidcError::InvalidUrl {
            url: client.redirect_uri().to_string(),
            reason: err.to_string(),
        })?;

    let metadata = CoreProviderMetadata::discover_async(issuer_url, async_http_client)
        .await
        .map_err(|err| OidcError::Discovery(err.to_string()))?;
    let oidc_client = CoreClient::from_provider_metadata(
        metadata,
        ClientId::new(client.client_id().to_string()),
        Some(ClientSecret::new(client.client_secret().to_string())),
    )
    .set_redirect_uri(redirect_url);

    let (mut authorize_url, state, nonce) = SCOPES[1..]
        .iter()
        .fold(
            oidc_client.authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            ),
            |request, scope| request.add_scope(Scope::new(scope.to_string())),
        )
        .url();
    // connector of Dex's local password database
    authorize_url
        .path_segments_mut()
        .map_err(|_| OidcError::InvalidUrl {
            url: issuer_uri.to_string(),
            reason: "authorization endpoint cannot be a base".to_string(),
        })?
        .push("local");

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let login_location = http.get(authorize_url.clone()).send().await?;
    let login_url = location(&authorize_url, &login_location).ok_or(OidcError::NoLoginRedirect)?;
    debug!(login_url = %login_url, "Posting credentials to the Dex login form");

    let mut response = http
        .post(login_url.clone())
        .form(&[
            ("login", user.email()),
            ("password", user.clear_text_password()),
        ])
        .send()
        .await?;
    let mut current = login_url;
    let mut callback = None;
    for _ in 0..MAX_REDIRECTS {
        let Some(next) = location(&current, &response) else {
            break;
        };
        if next.as_str().starts_with(client.redirect_uri()) {
            callback = Some(next);
            break;
        }
        response = http.get(next.clone()).send().await?;
        current = next;
    }
    let callback = callback.ok_or(OidcError::NoRedirectWithCode)?;
    let code = authorization_code(&callback, &state)?;

    let token = oidc_client
        .exchange_code(code)
        .request_async(async_http_client)
        .await
        .map_err(|err| OidcError::TokenExchange(err.to_string()))?;
    let id_token = token
        .extra_fields()
        .id_token()
        .ok_or(OidcError::MissingIdToken)?;
    id_token
        .claims(&oidc_client.id_token_verifier(), &nonce)
        .map_err(|err| OidcError::IdToken(err.to_string()))?;

    let scopes = match token.scopes() {
        Some(scopes) => scopes.iter().map(|scope| scope.to_string()).collect(),
        None => SCOPES.iter().map(|scope| scope.to_string()).collect(),
    };
    Ok(TokenResponse {
        id_token: id_token.to_string(),
        access_token: token.access_token().secret().clone(),
        scopes,
    })
}

fn location(base: &Url, response: &reqwest::Response) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(reqwest::header::LOCATION)?;
    base.join(location.to_str().ok()?).ok()
}

fn authorization_code(callback: &Url, state: &CsrfToken) -> Result<AuthorizationCode, OidcError> {
    let mut code = None;
    let mut returned_state = None;
    for (key, value) in callback.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => returned_state = Some(value.into_owned()),
            _ => {}
        }
    }

    if returned_state.as_deref() != Some(state.secret().as_str()) {
        return Err(OidcError::StateMismatch);
    }
    code.map(AuthorizationCode::new)
        .ok_or(OidcError::MissingCode)
}

fn jwt_claims(jwt: &str) -> Result<Map<String, Value>, OidcError> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| OidcError::Jwt("expected three dot-separated parts".to_string()))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| OidcError::Jwt(err.to_string()))?;
    serde_json::from_slice(&decoded).map_err(|err| OidcError::Jwt(err.to_string()))
}
