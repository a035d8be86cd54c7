// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Process-wide TLS crypto provider installation.
//!
//! Both the WebSocket transport and the reqwest fetcher negotiate TLS through rustls, which
//! needs a default `CryptoProvider` before the first `wss://` or `https://` request.

use std::sync::Once;

use rustls::crypto::{CryptoProvider, aws_lc_rs};

static INSTALL_PROVIDER: Once = Once::new();

/// Installs the `aws_lc_rs` provider as the rustls default, once per process.
///
/// A provider installed by the host application first is left in place.
pub fn install_cryptographic_provider() {
    INSTALL_PROVIDER.call_once(|| {
        if CryptoProvider::get_default().is_some() {
            tracing::trace!("Keeping existing rustls crypto provider");
            return;
        }

        if aws_lc_rs::default_provider().install_default().is_err() {
            // Another thread installed one between the check and the install
            tracing::debug!("Rustls crypto provider installed concurrently");
        } else {
            tracing::debug!("Installed aws_lc_rs rustls crypto provider");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent() {
        install_cryptographic_provider();
        install_cryptographic_provider();
        assert!(CryptoProvider::get_default().is_some());
    }
}
