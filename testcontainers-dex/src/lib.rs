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

//! A disposable [Dex](https://dexidp.io) OpenID Connect provider for integration tests.
//!
//! [`DexContainer`] describes the provider, its OAuth2 clients and its password users.
//! Starting it yields a [`RunningDexContainer`] whose issuer URI reflects the port mapped on the
//! host, and which keeps clients and users in sync with Dex through its gRPC admin API.

/// The Dex gRPC admin API, and a client for it
pub mod api;

/// Container settings, overridable from the environment
pub mod config;

/// Starting, inspecting and mutating the Dex container
pub mod container;

pub mod error;

/// OAuth2 clients and password users
pub mod model;

/// Helpers to log in against a running Dex and inspect the issued tokens
pub mod oidc;

pub mod tracing;

mod registry;

pub use config::DexConfig;
pub use container::{DexContainer, RunningDexContainer};
pub use error::{DexApiError, DexError, ValidationError};
pub use model::{Client, User};

#[cfg(test)]
test_r::enable!();
