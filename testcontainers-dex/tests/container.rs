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

use assert2::{assert, let_assert};
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_r::{test, test_dep};
use testcontainers_dex::oidc::{obtain_token, openid_configuration, OidcError};
use testcontainers_dex::tracing::{init_tracing_with_default_debug_env_filter, TracingConfig};
use testcontainers_dex::{Client, DexContainer, RunningDexContainer, User};

test_r::enable!();

#[derive(Debug)]
pub struct Tracing;

#[test_dep]
pub fn tracing() -> Tracing {
    // fails if a global subscriber is already set
    let _ = init_tracing_with_default_debug_env_filter(
        &TracingConfig::test_pretty_without_time("testcontainers-dex-tests")
            .with_env_overrides()
            .expect("Invalid TESTCONTAINERS_DEX_TRACING__ overrides"),
    );

    Tracing
}

async fn start(dex: DexContainer) -> RunningDexContainer {
    tryhard::retry_fn(|| dex.clone().start())
        .retries(3)
        .exponential_backoff(Duration::from_millis(100))
        .await
        .expect("Failed to start the Dex container")
}

fn client(id: &str) -> Client {
    Client::new(
        id,
        format!("{id}-secret"),
        format!("http://localhost:8080/{id}/callback"),
    )
    .unwrap()
}

fn user(name: &str) -> User {
    User::new(name, format!("{name}@example.com"), format!("{name}-password")).unwrap()
}

#[test]
async fn boots(_tracing: &Tracing) {
    let dex = start(DexContainer::from_env().unwrap()).await;

    assert!(dex.is_running().await);
    assert!(dex.is_serving().await);
    assert!(dex.issuer_uri().starts_with("http://"));
    assert!(dex.issuer_uri().ends_with("/dex"));

    dex.stop().await.unwrap();
}

#[test]
async fn serves_discovery_document_for_its_issuer(_tracing: &Tracing) {
    let dex = start(DexContainer::from_env().unwrap()).await;

    let configuration = openid_configuration(dex.issuer_uri()).await.unwrap();

    assert_eq!(configuration.issuer, dex.issuer_uri());
    assert_eq!(
        configuration.authorization_endpoint,
        format!("{}/auth", dex.issuer_uri())
    );
    assert_eq!(
        configuration.token_endpoint,
        format!("{}/token", dex.issuer_uri())
    );
    assert_eq!(configuration.jwks_uri, format!("{}/keys", dex.issuer_uri()));
}

#[test]
async fn runs_older_dex_version(_tracing: &Tracing) {
    let dex = start(DexContainer::from_env().unwrap().with_tag("v2.36.0")).await;

    assert!(dex.config().tag == "v2.36.0");
    let configuration = openid_configuration(dex.issuer_uri()).await.unwrap();
    assert_eq!(configuration.issuer, dex.issuer_uri());
}

#[test]
async fn issues_tokens_for_default_client_and_user(_tracing: &Tracing) {
    let dex = start(DexContainer::from_env().unwrap()).await;
    let client = dex.client().unwrap().clone();
    let user = dex.user().unwrap().clone();

    let token = obtain_token(dex.issuer_uri(), &client, &user)
        .await
        .unwrap();
    let claims = token.id_token_claims().unwrap();

    assert!(client.client_id() == "example-app");
    assert!(claims["iss"] == dex.issuer_uri());
    assert!(claims["aud"] == "example-app");
    assert!(claims["name"] == "admin");
    assert!(claims["email"] == "admin@example.com");
    assert!(token.access_token_claims().unwrap()["iss"] == dex.issuer_uri());
}

#[test]
async fn registers_multiple_clients(_tracing: &Tracing) {
    let first = client("first");
    let second = client("second");
    let dex = start(
        DexContainer::from_env()
            .unwrap()
            .with_client(first.clone())
            .with_client(second.clone()),
    )
    .await;
    let admin = dex.user().unwrap().clone();

    assert!(dex.clients() == vec![&first, &second]);
    let first_token = obtain_token(dex.issuer_uri(), &first, &admin).await.unwrap();
    let second_token = obtain_token(dex.issuer_uri(), &second, &admin)
        .await
        .unwrap();
    assert!(first_token.id_token_claims().unwrap()["aud"] == "first");
    assert!(second_token.id_token_claims().unwrap()["aud"] == "second");
}

#[test]
async fn adds_client_after_start(_tracing: &Tracing) {
    let mut dex = start(DexContainer::from_env().unwrap()).await;
    let admin = dex.user().unwrap().clone();
    let late = client("late");

    let previous = dex.add_client(late.clone()).await.unwrap();

    assert!(previous.is_none());
    assert!(dex.clients().len() == 2);
    let token = obtain_token(dex.issuer_uri(), &late, &admin).await.unwrap();
    assert!(token.id_token_claims().unwrap()["aud"] == "late");
}

#[test]
async fn re_adding_a_client_updates_it(_tracing: &Tracing) {
    let original = client("app");
    let mut dex = start(DexContainer::from_env().unwrap().with_client(original.clone())).await;
    let admin = dex.user().unwrap().clone();
    let updated = Client::new("app", "new-secret", original.redirect_uri()).unwrap();

    let previous = dex.add_client(updated.clone()).await.unwrap();

    assert!(previous == Some(original.clone()));
    assert!(dex.clients() == vec![&updated]);
    let_assert!(
        Err(OidcError::TokenExchange(_)) = obtain_token(dex.issuer_uri(), &original, &admin).await
    );
    let token = obtain_token(dex.issuer_uri(), &updated, &admin).await;
    assert!(token.is_ok());
}

#[test]
async fn removes_client(_tracing: &Tracing) {
    let kept = client("kept");
    let removed = client("removed");
    let mut dex = start(
        DexContainer::from_env()
            .unwrap()
            .with_client(kept.clone())
            .with_client(removed.clone()),
    )
    .await;
    let admin = dex.user().unwrap().clone();

    let result = dex.remove_client("removed").await.unwrap();

    assert!(result == Some(removed.clone()));
    assert!(dex.clients() == vec![&kept]);
    assert!(obtain_token(dex.issuer_uri(), &removed, &admin)
        .await
        .is_err());
}

#[test]
async fn removing_unknown_client_is_a_no_op(_tracing: &Tracing) {
    let mut dex = start(DexContainer::from_env().unwrap()).await;

    let result = dex.remove_client("unknown").await.unwrap();

    assert!(result.is_none());
    assert!(dex.clients().len() == 1);
}

#[test]
async fn removing_unknown_user_is_a_no_op(_tracing: &Tracing) {
    let mut dex = start(DexContainer::from_env().unwrap()).await;

    let result = dex.remove_user("unknown@example.com").await.unwrap();

    assert!(result.is_none());
    assert!(dex.users().len() == 1);
    let client = dex.client().unwrap().clone();
    let admin = dex.user().unwrap().clone();
    assert!(obtain_token(dex.issuer_uri(), &client, &admin).await.is_ok());
}

#[test]
async fn registers_multiple_users(_tracing: &Tracing) {
    let alice = user("alice");
    let bob = user("bob");
    let dex = start(
        DexContainer::from_env()
            .unwrap()
            .with_user(alice.clone())
            .with_user(bob.clone()),
    )
    .await;
    let client = dex.client().unwrap().clone();

    let alice_claims = obtain_token(dex.issuer_uri(), &client, &alice)
        .await
        .unwrap()
        .id_token_claims()
        .unwrap();
    let bob_claims = obtain_token(dex.issuer_uri(), &client, &bob)
        .await
        .unwrap()
        .id_token_claims()
        .unwrap();

    assert!(alice_claims["name"] == "alice");
    assert!(bob_claims["email"] == "bob@example.com");
    assert!(alice_claims["sub"] != bob_claims["sub"]);
}

#[test]
async fn adds_user_after_start(_tracing: &Tracing) {
    let mut dex = start(DexContainer::from_env().unwrap()).await;
    let client = dex.client().unwrap().clone();
    let carol = user("carol");

    dex.add_user(carol.clone()).await.unwrap();

    assert!(dex.users().len() == 2);
    let claims = obtain_token(dex.issuer_uri(), &client, &carol)
        .await
        .unwrap()
        .id_token_claims()
        .unwrap();
    assert!(claims["email"] == "carol@example.com");
}

#[test]
async fn removes_user(_tracing: &Tracing) {
    let alice = user("alice");
    let bob = user("bob");
    let mut dex = start(
        DexContainer::from_env()
            .unwrap()
            .with_user(alice.clone())
            .with_user(bob.clone()),
    )
    .await;
    let client = dex.client().unwrap().clone();

    let removed = dex.remove_user("alice@example.com").await.unwrap();

    assert!(removed == Some(alice.clone()));
    assert!(dex.users() == vec![&bob]);
    let_assert!(
        Err(OidcError::NoRedirectWithCode) = obtain_token(dex.issuer_uri(), &client, &alice).await
    );
}

#[test]
async fn stopped_container_can_be_started_again(_tracing: &Tracing) {
    let alice = user("alice");
    let dex = start(DexContainer::from_env().unwrap().with_user(alice.clone())).await;

    let definition = dex.stop().await.unwrap();
    let restarted = start(definition).await;

    let client = restarted.client().unwrap().clone();
    let token = obtain_token(restarted.issuer_uri(), &client, &alice).await;
    assert!(token.is_ok());
}
