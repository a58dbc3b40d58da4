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

#[cfg(test)]
test_r::enable!();

pub mod proto {
    tonic::include_proto!("mod");

    impl api::Client {
        /// A confidential client with a single redirect URI, the only shape registered by the
        /// test container.
        pub fn confidential(id: &str, secret: &str, redirect_uri: &str) -> Self {
            Self {
                id: id.to_string(),
                secret: secret.to_string(),
                redirect_uris: vec![redirect_uri.to_string()],
                name: id.to_string(),
                ..Default::default()
            }
        }
    }

}
