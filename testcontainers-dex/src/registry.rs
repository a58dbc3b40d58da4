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

use crate::api::DexApi;
use crate::error::DexError;
use crate::model::{Client, User};
use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Clients keyed by id and users keyed by email, both in insertion order.
///
/// Until [`Registry::connect`] is called every mutation is local. Once connected, the provider is
/// updated first and the local sets follow only if that succeeded.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    clients: IndexMap<String, Client>,
    users: IndexMap<String, User>,
    api: Option<Arc<dyn DexApi>>,
}

impl Registry {
    pub fn insert_client(&mut self, client: Client) -> Option<Client> {
        self.clients.insert(client.client_id().to_string(), client)
    }

    pub fn take_client(&mut self, client_id: &str) -> Option<Client> {
        self.clients.shift_remove(client_id)
    }

    pub fn insert_user(&mut self, user: User) -> Option<User> {
        self.users.insert(user.email().to_string(), user)
    }

    pub fn take_user(&mut self, email: &str) -> Option<User> {
        self.users.shift_remove(email)
    }

    pub fn client(&self) -> Option<&Client> {
        self.clients.values().next()
    }

    pub fn client_by_id(&self, client_id: &str) -> Option<&Client> {
        self.clients.get(client_id)
    }

    pub fn clients(&self) -> Vec<&Client> {
        self.clients.values().collect()
    }

    pub fn user(&self) -> Option<&User> {
        self.users.values().next()
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.get(email)
    }

    pub fn users(&self) -> Vec<&User> {
        self.users.values().collect()
    }

    pub fn is_connected(&self) -> bool {
        self.api.is_some()
    }

    /// Adds the default client and user where none were configured, then registers everything
    /// with the provider.
    pub async fn connect(&mut self, api: Arc<dyn DexApi>) -> Result<(), DexError> {
        if self.clients.is_empty() {
            debug!("No client configured, registering the example-app client");
            self.insert_client(Client::example_app());
        }
        if self.users.is_empty() {
            debug!("No user configured, registering the admin user");
            self.insert_user(User::admin()?);
        }

        for client in self.clients.values() {
            api.create_client(client).await?;
        }
        for user in self.users.values() {
            api.create_password(user).await?;
        }
        info!(
            clients = self.clients.len(),
            users = self.users.len(),
            "Registered clients and users"
        );

        self.api = Some(api);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.api = None;
    }

    /// Registers the client, replacing any client with the same id.
    ///
    /// If Dex deleted the previous client but then failed to create the new one, the previous
    /// client is dropped locally too.
    pub async fn upsert_client(&mut self, client: Client) -> Result<Option<Client>, DexError> {
        if let Some(api) = self.api.clone() {
            api.delete_client(client.client_id()).await?;
            if let Err(err) = api.create_client(&client).await {
                if self.take_client(client.client_id()).is_some() {
                    warn!(
                        client_id = client.client_id(),
                        "Dropped client that Dex deleted but could not re-create"
                    );
                }
                return Err(err.into());
            }
        }
        Ok(self.insert_client(client))
    }

    pub async fn remove_client(&mut self, client_id: &str) -> Result<Option<Client>, DexError> {
        if let Some(api) = &self.api {
            api.delete_client(client_id).await?;
        }
        Ok(self.take_client(client_id))
    }

    /// Registers the user, replacing any user with the same email. A failed create after a
    /// successful delete drops the previous user locally, as for clients.
    pub async fn upsert_user(&mut self, user: User) -> Result<Option<User>, DexError> {
        if let Some(api) = self.api.clone() {
            api.delete_password(user.email()).await?;
            if let Err(err) = api.create_password(&user).await {
                if self.take_user(user.email()).is_some() {
                    warn!(
                        email = user.email(),
                        "Dropped user that Dex deleted but could not re-create"
                    );
                }
                return Err(err.into());
            }
        }
        Ok(self.insert_user(user))
    }

    pub async fn remove_user(&mut self, email: &str) -> Result<Option<User>, DexError> {
        if let Some(api) = &self.api {
            api.delete_password(email).await?;
        }
        Ok(self.take_user(email))
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .field("users", &self.users.keys().collect::<Vec<_>>())
            .field("connected", &self.is_connected())
            .finish()
    }
}
