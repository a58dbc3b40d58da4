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

use crate::error::ValidationError;
use uuid::Uuid;

/// bcrypt cost of user password hashes
const BCRYPT_COST: u32 = 10;

/// An OAuth 2 / OpenID Connect client, registered with Dex as a confidential client with a
/// single redirect URI.
///
/// See [RFC 6749, section 2](https://datatracker.ietf.org/doc/html/rfc6749#section-2).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Client {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl Client {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            client_id: not_blank(client_id.into(), "client_id")?,
            client_secret: not_blank(client_secret.into(), "client_secret")?,
            redirect_uri: not_blank(redirect_uri.into(), "redirect_uri")?,
        })
    }

    /// The client registered when none was configured before start.
    pub(crate) fn example_app() -> Self {
        Self {
            client_id: "example-app".to_string(),
            client_secret: "ZXhhbXBsZS1hcHAtc2VjcmV0".to_string(),
            redirect_uri: "http://127.0.0.1:5555/callback".to_string(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }
}

/// A user that logs in with an email and a password through Dex's password database.
///
/// The password is bcrypt-hashed once, at construction, and the user gets a random id. Two users
/// built from the same inputs are therefore distinct. The `username` ends up in the `name` claim
/// of issued id tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    username: String,
    email: String,
    clear_text_password: String,
    bcrypt_password: String,
    user_id: Uuid,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        clear_text_password: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let username = not_blank(username.into(), "username")?;
        let email = not_blank(email.into(), "email")?;
        let clear_text_password = not_blank(clear_text_password.into(), "clear_text_password")?;
        let bcrypt_password = bcrypt::hash(&clear_text_password, BCRYPT_COST)?;

        Ok(Self {
            username,
            email,
            clear_text_password,
            bcrypt_password,
            user_id: Uuid::new_v4(),
        })
    }

    /// The user registered when none was configured before start.
    pub(crate) fn admin() -> Result<Self, ValidationError> {
        Self::new("admin", "admin@example.com", "password")
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// The password to type in Dex's login form.
    pub fn clear_text_password(&self) -> &str {
        &self.clear_text_password
    }

    pub fn bcrypt_password(&self) -> &str {
        &self.bcrypt_password
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

fn not_blank(value: String, field: &'static str) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Blank(field))
    } else {
        Ok(value)
    }
}
