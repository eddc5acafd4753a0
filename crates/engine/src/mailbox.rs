//! The tamper-resistant emergency mailbox.
//!
//! An append-only drop directory outside the workspace.  Workers deposit
//! messages; the Supervisor process has no read or list path to them by
//! construction — deposits are one-way and failures are logged without
//! ever being surfaced to the Supervisor.  Payloads are hybrid-encrypted
//! to the operator: a fresh AES-256-GCM key per message, wrapped with
//! the operator's RSA public key (OAEP/SHA-256).

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use serde::Serialize;
use sha2::Sha256;

use axe_domain::trace::TraceEvent;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// On-disk envelope: everything the operator needs to decrypt offline.
#[derive(Serialize)]
struct SealedMessage<'a> {
    wrapped_key: String,
    nonce: String,
    ciphertext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

pub struct EmergencyMailbox {
    dir: PathBuf,
    operator_key: Option<RsaPublicKey>,
}

impl EmergencyMailbox {
    /// Set up the drop directory (created write-only for non-owners on
    /// unix) and load the operator's public key if configured.  Setup
    /// problems are logged, never returned — a broken mailbox must not
    /// take the session down or tip off a rogue Supervisor.
    pub fn new(dir: PathBuf, operator_key_pem: Option<&Path>) -> Self {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::error!(dir = %dir.display(), error = %e, "mailbox directory unavailable");
        } else {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                // rwx-wx-wx: anyone may drop a file, only the owner
                // (operator) may list or read.
                let perms = std::fs::Permissions::from_mode(0o733);
                if let Err(e) = std::fs::set_permissions(&dir, perms) {
                    tracing::warn!(error = %e, "could not restrict mailbox permissions");
                }
            }
        }

        let operator_key = operator_key_pem.and_then(|path| {
            match std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|pem| {
                    RsaPublicKey::from_public_key_pem(&pem).map_err(|e| e.to_string())
                }) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "operator public key unusable; mailbox will store plaintext");
                    None
                }
            }
        });

        Self { dir, operator_key }
    }

    /// Deposit one message.  Infallible by contract: failures are logged
    /// and swallowed (`supervisor_emergency_write_failed`).
    pub fn deposit(&self, payload: &str) {
        let body = match &self.operator_key {
            Some(key) => match seal(key, payload) {
                Ok(sealed) => sealed,
                Err(e) => {
                    tracing::error!(error = %e, "supervisor_emergency_write_failed: seal");
                    return;
                }
            },
            None => {
                // No operator key configured: the directory permissions
                // are the only shield.  Still better than dropping the
                // report.
                serde_json::to_string(&SealedMessage {
                    wrapped_key: String::new(),
                    nonce: String::new(),
                    ciphertext: BASE64.encode(payload),
                    note: Some("unencrypted: no operator key configured"),
                })
                .unwrap_or_default()
            }
        };

        let name = format!(
            "{}-{}.json",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            uuid::Uuid::new_v4().as_simple()
        );
        match std::fs::write(self.dir.join(&name), &body) {
            Ok(()) => {
                TraceEvent::MailboxWrite { bytes: body.len() }.emit();
            }
            Err(e) => {
                tracing::error!(error = %e, "supervisor_emergency_write_failed: write");
            }
        }
    }
}

fn seal(operator_key: &RsaPublicKey, payload: &str) -> Result<String, String> {
    let mut key_bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key_bytes);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), payload.as_bytes())
        .map_err(|e| format!("aes-gcm: {e}"))?;

    let wrapped_key = operator_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &key_bytes)
        .map_err(|e| format!("rsa-oaep: {e}"))?;

    serde_json::to_string(&SealedMessage {
        wrapped_key: BASE64.encode(wrapped_key),
        nonce: BASE64.encode(nonce_bytes),
        ciphertext: BASE64.encode(ciphertext),
        note: None,
    })
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::RsaPrivateKey;

    #[test]
    fn deposit_writes_sealed_file_operator_can_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let mailbox_dir = dir.path().join("mailbox");

        let private = RsaPrivateKey::new(&mut OsRng, 2048).expect("keygen");
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();
        let key_path = dir.path().join("operator.pem");
        std::fs::write(&key_path, public_pem).unwrap();

        let mailbox = EmergencyMailbox::new(mailbox_dir.clone(), Some(&key_path));
        mailbox.deposit("the supervisor has gone rogue");

        // Owner (operator) side: read, unwrap, decrypt.
        let entries: Vec<_> = std::fs::read_dir(&mailbox_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let raw = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let sealed: serde_json::Value = serde_json::from_str(&raw).unwrap();

        let wrapped = BASE64.decode(sealed["wrapped_key"].as_str().unwrap()).unwrap();
        let key_bytes = private.decrypt(Oaep::new::<Sha256>(), &wrapped).unwrap();
        let nonce = BASE64.decode(sealed["nonce"].as_str().unwrap()).unwrap();
        let ciphertext = BASE64.decode(sealed["ciphertext"].as_str().unwrap()).unwrap();

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let plain = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .unwrap();
        assert_eq!(plain, b"the supervisor has gone rogue");

        // The sealed file never contains the plaintext.
        assert!(!raw.contains("rogue"));
    }

    #[test]
    fn deposit_without_key_still_lands_with_note() {
        let dir = tempfile::TempDir::new().unwrap();
        let mailbox = EmergencyMailbox::new(dir.path().join("mb"), None);
        mailbox.deposit("report");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("mb")).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let raw = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert!(raw.contains("no operator key configured"));
    }

    #[test]
    fn deposit_never_panics_on_unwritable_dir() {
        let mailbox = EmergencyMailbox::new(PathBuf::from("/proc/definitely/not/writable"), None);
        mailbox.deposit("swallowed");
    }

    #[cfg(unix)]
    #[test]
    fn mailbox_directory_is_unlistable_by_others() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let mb = dir.path().join("mb");
        let _ = EmergencyMailbox::new(mb.clone(), None);
        let mode = std::fs::metadata(&mb).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o733);
    }
}
