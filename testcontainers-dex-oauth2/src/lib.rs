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

//! Wires a running [`testcontainers_dex::RunningDexContainer`] into the OAuth2 client
//! configuration of an application under test.
//!
//! The application needs the issuer URI before it starts, and Dex needs the application's
//! redirect URI, which depends on the port the application binds. So Dex is started first, the
//! application is configured from [`DexConnectionDetails`], and once the application knows its
//! port [`DexAutoConfiguration::on_server_started`] registers it as a client of the running
//! container.

pub mod autoconfigure;
pub mod details;
pub mod error;
pub mod registration;

pub use autoconfigure::DexAutoConfiguration;
pub use details::{ContainerConnectionDetails, DexConnectionDetails};
pub use error::DexOAuth2Error;
pub use registration::{ClientRegistration, ClientRegistrationRepository, ProviderDetails};

#[cfg(test)]
test_r::enable!();
