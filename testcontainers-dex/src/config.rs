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

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DexConfig {
    pub image: String,
    pub tag: String,
    /// Applied to each startup wait on its own: first to the container's readiness message,
    /// then to Dex serving its discovery document. A full start can take up to twice as long.
    #[serde(with = "humantime_serde")]
    pub startup_timeout: Duration,
    pub container_name: Option<String>,
    pub network: Option<String>,
}

impl DexConfig {
    pub const DEFAULT_IMAGE_NAME: &'static str = "dexidp/dex";
    pub const DEFAULT_TAG: &'static str = "v2.45.0";
    pub const ENV_PREFIX: &'static str = "TESTCONTAINERS_DEX__";
    pub const CONFIG_FILE: &'static str = "testcontainers-dex.toml";

    /// Defaults, overridden by `testcontainers-dex.toml` in the working directory (if present),
    /// overridden by `TESTCONTAINERS_DEX__*` environment variables.
    pub fn from_env() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(Self::CONFIG_FILE))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    pub fn with_container_name(mut self, container_name: impl Into<String>) -> Self {
        self.container_name = Some(container_name.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            image: Self::DEFAULT_IMAGE_NAME.to_string(),
            tag: Self::DEFAULT_TAG.to_string(),
            startup_timeout: Duration::from_secs(10),
            container_name: None,
            network: None,
        }
    }
}
