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

use crate::api::{DexApi, DexGrpcApi};
use crate::config::DexConfig;
use crate::error::DexError;
use crate::model::{Client, User};
use crate::registry::Registry;
use serde::Serialize;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use testcontainers::core::{CmdWaitFor, ExecCommand, IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tracing::{debug, info};

pub const HTTP_PORT: u16 = 5556;
pub const GRPC_PORT: u16 = 5557;
pub const CONFIG_FILE: &str = "/var/dex/dex.yml";

const WAITING_MESSAGE: &str = "Waiting for configuration file";
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);
const EXEC_TIMEOUT: Duration = Duration::from_secs(10);
const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An unstarted Dex container: image settings plus the clients and users to register on start.
///
/// ```no_run
/// # async fn run() -> Result<(), testcontainers_dex::DexError> {
/// use testcontainers_dex::{Client, DexContainer};
///
/// let dex = DexContainer::default()
///     .with_client(Client::new("my-app", "my-secret", "http://localhost:8080/callback")?)
///     .start()
///     .await?;
/// println!("issuer: {}", dex.issuer_uri());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct DexContainer {
    config: DexConfig,
    registry: Registry,
}

impl DexContainer {
    pub fn new(config: DexConfig) -> Self {
        Self {
            config,
            registry: Registry::default(),
        }
    }

    /// A definition configured through [`DexConfig::from_env`].
    pub fn from_env() -> Result<Self, DexError> {
        Ok(Self::new(DexConfig::from_env()?))
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.config = self.config.with_tag(tag);
        self
    }

    /// Adds a client, replacing the one with the same id.
    pub fn with_client(mut self, client: Client) -> Self {
        self.registry.insert_client(client);
        self
    }

    /// Adds a user, replacing the one with the same email.
    pub fn with_user(mut self, user: User) -> Self {
        self.registry.insert_user(user);
        self
    }

    pub fn remove_client(&mut self, client_id: &str) -> Option<Client> {
        self.registry.take_client(client_id)
    }

    pub fn remove_user(&mut self, email: &str) -> Option<User> {
        self.registry.take_user(email)
    }

    pub fn config(&self) -> &DexConfig {
        &self.config
    }

    pub fn client(&self) -> Option<&Client> {
        self.registry.client()
    }

    pub fn client_by_id(&self, client_id: &str) -> Option<&Client> {
        self.registry.client_by_id(client_id)
    }

    pub fn clients(&self) -> Vec<&Client> {
        self.registry.clients()
    }

    pub fn user(&self) -> Option<&User> {
        self.registry.user()
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.registry.user_by_email(email)
    }

    pub fn users(&self) -> Vec<&User> {
        self.registry.users()
    }

    /// Starts the container, configures Dex for the mapped HTTP port, waits until it serves its
    /// discovery document and registers all clients and users.
    ///
    /// If no client or user was added, the `example-app` client and the `admin` user are
    /// registered.
    pub async fn start(self) -> Result<RunningDexContainer, DexError> {
        let Self {
            config,
            mut registry,
        } = self;
        info!(image = %config.image_reference(), "Starting Dex container");

        let container = Self::container_request(&config).start().await?;
        let host = container.get_host().await?.to_string();
        let http_port = container.get_host_port_ipv4(HTTP_PORT.tcp()).await?;
        let grpc_port = container.get_host_port_ipv4(GRPC_PORT.tcp()).await?;
        let issuer_uri = issuer_uri(&host, http_port);
        debug!(
            container_id = container.id(),
            issuer_uri = %issuer_uri,
            grpc_port,
            "Dex container started"
        );

        let configuration = render_configuration(&issuer_uri)?;
        write_configuration(&container, &configuration).await?;

        let http = reqwest::Client::new();
        wait_until_serving(&http, &issuer_uri, config.startup_timeout).await?;

        let api = DexGrpcApi::connect(&host, grpc_port).await?;
        let version = api.version().await?;
        info!(
            server = %version.server,
            api = version.api,
            issuer_uri = %issuer_uri,
            "Dex is ready"
        );
        registry.connect(Arc::new(api)).await?;

        Ok(RunningDexContainer {
            config,
            registry,
            container,
            host,
            http_port,
            grpc_port,
            issuer_uri,
            configuration,
            http,
        })
    }

    fn container_request(config: &DexConfig) -> testcontainers::ContainerRequest<GenericImage> {
        let command = format!(
            "while [ ! -f {CONFIG_FILE} ]; do sleep 1; echo \"{WAITING_MESSAGE}...\"; done; dex serve {CONFIG_FILE}"
        );
        let mut request = GenericImage::new(&config.image, &config.tag)
            .with_exposed_port(HTTP_PORT.tcp())
            .with_exposed_port(GRPC_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout(WAITING_MESSAGE))
            .with_cmd(["/bin/sh".to_string(), "-c".to_string(), command])
            .with_startup_timeout(config.startup_timeout);

        if let Some(name) = &config.container_name {
            request = request.with_container_name(name);
        }
        if let Some(network) = &config.network {
            request = request.with_network(network);
        }
        request
    }
}

/// A started Dex container. Dropping it removes the container.
pub struct RunningDexContainer {
    config: DexConfig,
    registry: Registry,
    container: ContainerAsync<GenericImage>,
    host: String,
    http_port: u16,
    grpc_port: u16,
    issuer_uri: String,
    configuration: String,
    http: reqwest::Client,
}

impl RunningDexContainer {
    /// `http://<host>:<mapped http port>/dex`, the `issuer` of the discovery document.
    pub fn issuer_uri(&self) -> &str {
        &self.issuer_uri
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn grpc_port(&self) -> u16 {
        self.grpc_port
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    pub fn config(&self) -> &DexConfig {
        &self.config
    }

    /// The Dex YAML configuration written into the container.
    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    /// Whether the container still runs. Docker refuses to exec into a stopped container.
    pub async fn is_running(&self) -> bool {
        matches!(exec_shell(&self.container, "true".to_string()).await, Ok((0, _)))
    }

    /// Whether Dex currently answers on its discovery endpoint.
    pub async fn is_serving(&self) -> bool {
        discovery_responds(&self.http, &self.issuer_uri).await
    }

    /// Registers the client with Dex, replacing any client with the same id. The replaced
    /// client's secret stops working.
    pub async fn add_client(&mut self, client: Client) -> Result<Option<Client>, DexError> {
        self.registry.upsert_client(client).await
    }

    pub async fn remove_client(&mut self, client_id: &str) -> Result<Option<Client>, DexError> {
        self.registry.remove_client(client_id).await
    }

    /// Registers the user with Dex, replacing any user with the same email.
    pub async fn add_user(&mut self, user: User) -> Result<Option<User>, DexError> {
        self.registry.upsert_user(user).await
    }

    pub async fn remove_user(&mut self, email: &str) -> Result<Option<User>, DexError> {
        self.registry.remove_user(email).await
    }

    pub fn client(&self) -> Option<&Client> {
        self.registry.client()
    }

    pub fn client_by_id(&self, client_id: &str) -> Option<&Client> {
        self.registry.client_by_id(client_id)
    }

    pub fn clients(&self) -> Vec<&Client> {
        self.registry.clients()
    }

    pub fn user(&self) -> Option<&User> {
        self.registry.user()
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.registry.user_by_email(email)
    }

    pub fn users(&self) -> Vec<&User> {
        self.registry.users()
    }

    /// Closes the gRPC channel and removes the container. The returned definition carries the
    /// clients and users of this container and can be started again.
    pub async fn stop(self) -> Result<DexContainer, DexError> {
        let Self {
            config,
            mut registry,
            container,
            ..
        } = self;
        registry.disconnect();

        let id = container.id().to_string();
        container.rm().await?;
        info!(container_id = %id, "Dex container removed");

        Ok(DexContainer { config, registry })
    }
}

impl Debug for RunningDexContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningDexContainer")
            .field("id", &self.container.id())
            .field("issuer_uri", &self.issuer_uri)
            .field("grpc_port", &self.grpc_port)
            .field("registry", &self.registry)
            .finish()
    }
}

fn issuer_uri(host: &str, http_port: u16) -> String {
    format!("http://{host}:{http_port}/dex")
}

fn discovery_url(issuer_uri: &str) -> String {
    format!("{issuer_uri}/.well-known/openid-configuration")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DexYaml<'a> {
    issuer: &'a str,
    storage: Storage,
    web: Web,
    grpc: Grpc,
    #[serde(rename = "enablePasswordDB")]
    enable_password_db: bool,
    oauth2: OAuth2,
}

#[derive(Serialize)]
struct Storage {
    #[serde(rename = "type")]
    kind: &'static str,
    config: StorageConfig,
}

#[derive(Serialize)]
struct StorageConfig {
    file: &'static str,
}

#[derive(Serialize)]
struct Web {
    http: String,
}

#[derive(Serialize)]
struct Grpc {
    addr: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OAuth2 {
    skip_approval_screen: bool,
}

fn render_configuration(issuer_uri: &str) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&DexYaml {
        issuer: issuer_uri,
        storage: Storage {
            kind: "sqlite3",
            config: StorageConfig {
                file: "/etc/dex/dex.db",
            },
        },
        web: Web {
            http: format!("0.0.0.0:{HTTP_PORT}"),
        },
        grpc: Grpc {
            addr: format!("0.0.0.0:{GRPC_PORT}"),
        },
        enable_password_db: true,
        oauth2: OAuth2 {
            skip_approval_screen: true,
        },
    })
}

/// Wraps `value` in single quotes for `/bin/sh`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Runs `script` with `/bin/sh -c` in the container and waits for it to exit. Returns the exit
/// code and the collected stderr.
async fn exec_shell(
    container: &ContainerAsync<GenericImage>,
    script: String,
) -> Result<(i64, Vec<u8>), DexError> {
    let mut result = container
        .exec(
            ExecCommand::new(["/bin/sh".to_string(), "-c".to_string(), script])
                .with_cmd_ready_condition(CmdWaitFor::Nothing),
        )
        .await?;

    let deadline = Instant::now() + EXEC_TIMEOUT;
    let exit_code = loop {
        if let Some(exit_code) = result.exit_code().await? {
            break exit_code;
        }
        if Instant::now() >= deadline {
            return Err(DexError::ExecTimeout(EXEC_TIMEOUT));
        }
        tokio::time::sleep(EXEC_POLL_INTERVAL).await;
    };
    let stderr = result.stderr_to_vec().await?;
    Ok((exit_code, stderr))
}

/// Writes to a temporary file first, so the startup loop never sees a partial configuration.
async fn write_configuration(
    container: &ContainerAsync<GenericImage>,
    configuration: &str,
) -> Result<(), DexError> {
    let script = format!(
        "printf '%s' {} > {CONFIG_FILE}.tmp && mv {CONFIG_FILE}.tmp {CONFIG_FILE}",
        shell_quote(configuration)
    );
    let (exit_code, stderr) = exec_shell(container, script).await?;
    if exit_code != 0 {
        return Err(DexError::ConfigWrite {
            exit_code,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        });
    }
    debug!(file = CONFIG_FILE, "Dex configuration written");
    Ok(())
}

async fn discovery_responds(http: &reqwest::Client, issuer_uri: &str) -> bool {
    match http.get(discovery_url(issuer_uri)).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

async fn wait_until_serving(
    http: &reqwest::Client,
    issuer_uri: &str,
    timeout: Duration,
) -> Result<(), DexError> {
    tokio::time::timeout(timeout, async {
        while !discovery_responds(http, issuer_uri).await {
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
    })
    .await
    .map_err(|_| DexError::StartupTimeout(timeout))
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::{
        discovery_url, issuer_uri, render_configuration, shell_quote, wait_until_serving,
        DexContainer,
    };
    use crate::config::DexConfig;
    use crate::error::DexError;
    use crate::model::{Client, User};
    use assert2::{assert, let_assert};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn renders_dex_configuration() {
        let rendered = render_configuration("http://localhost:32768/dex").unwrap();

        let value: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let expected: serde_yaml::Value = serde_yaml::from_str(
            r#"
            issuer: http://localhost:32768/dex
            storage:
              type: sqlite3
              config:
                file: /etc/dex/dex.db
            web:
              http: 0.0.0.0:5556
            grpc:
              addr: 0.0.0.0:5557
            enablePasswordDB: true
            oauth2:
              skipApprovalScreen: true
            "#,
        )
        .unwrap();
        assert_eq!(value, expected);
    }

    #[test]
    fn issuer_uses_mapped_host_and_port() {
        assert_eq!(issuer_uri("localhost", 49153), "http://localhost:49153/dex");
        assert_eq!(
            discovery_url("http://localhost:49153/dex"),
            "http://localhost:49153/dex/.well-known/openid-configuration"
        );
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn definition_defaults_to_configured_image_and_nothing_registered() {
        let dex = DexContainer::default().with_tag("v2.36.0");

        assert!(dex.config().image_reference() == "dexidp/dex:v2.36.0");
        assert!(dex.client().is_none());
        assert!(dex.user().is_none());
    }

    #[test]
    fn definition_collects_clients_and_users_in_order() {
        let first = Client::new("first", "first-secret", "https://first/callback").unwrap();
        let second = Client::new("second", "second-secret", "https://second/callback").unwrap();
        let alice = User::new("alice", "alice@example.com", "alice-password").unwrap();

        let dex = DexContainer::new(DexConfig::default())
            .with_client(first.clone())
            .with_client(second.clone())
            .with_user(alice.clone());

        assert!(dex.clients() == vec![&first, &second]);
        assert!(dex.client() == Some(&first));
        assert!(dex.client_by_id("second") == Some(&second));
        assert!(dex.user_by_email("alice@example.com") == Some(&alice));
    }

    #[test]
    fn definition_replaces_and_removes_entries() {
        let updated = Client::new("first", "new-secret", "https://first/callback").unwrap();
        let mut dex = DexContainer::default()
            .with_client(Client::new("first", "old-secret", "https://first/callback").unwrap())
            .with_client(Client::new("second", "second-secret", "https://second/callback").unwrap())
            .with_client(updated.clone())
            .with_user(User::new("alice", "alice@example.com", "alice-password").unwrap());

        assert!(dex.client() == Some(&updated));
        assert!(dex.remove_client("second").is_some());
        assert!(dex.remove_client("second").is_none());
        assert!(dex.remove_user("alice@example.com").is_some());
        assert!(dex.clients() == vec![&updated]);
        assert!(dex.users().is_empty());
    }

    #[test]
    async fn readiness_wait_times_out_when_nothing_serves_discovery() {
        let timeout = Duration::from_millis(300);

        // nothing listens on port 1
        let result =
            wait_until_serving(&reqwest::Client::new(), "http://127.0.0.1:1/dex", timeout).await;

        let_assert!(Err(DexError::StartupTimeout(waited)) = result);
        assert!(waited == timeout);
    }
}
