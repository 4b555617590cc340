use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crypto::PublicKey;

use super::{is_comment, split_lines, UsersError};

/// One authorized user: a display name, the identity public key presented
/// during authentication, its commitment, and the symmetric key paired
/// with the device. Comment lines read from the file directly above the
/// entry stay attached to it.
#[derive(Debug, Clone)]
pub struct UserEntry {
    name: String,
    public_key_der: Vec<u8>,
    public_key: PublicKey,
    commitment: Vec<u8>,
    symmetric_key: Vec<u8>,
    comments: Vec<String>,
}

impl UserEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    pub fn commitment(&self) -> &[u8] {
        &self.commitment
    }

    pub fn symmetric_key(&self) -> &[u8] {
        &self.symmetric_key
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    fn to_line(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.name,
            BASE64.encode(&self.commitment),
            BASE64.encode(&self.public_key_der),
            BASE64.encode(&self.symmetric_key),
        )
    }
}

/// The insertion-ordered list of authorized users. Entries are
/// de-duplicated by public key on add; lookups run over the DER encoding
/// of the presented key.
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    header: Vec<String>,
    entries: Vec<UserEntry>,
    trailing: Vec<String>,
}

impl UserStore {
    pub fn new() -> Self {
        UserStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserEntry> {
        self.entries.iter()
    }

    /// Adds a user, or updates the entry already holding the same public
    /// key.
    pub fn add_user(
        &mut self,
        name: &str,
        public_key: &PublicKey,
        symmetric_key: &[u8],
    ) -> Result<(), UsersError> {
        let der = crypto::public_key_der(public_key)?;
        let commitment = crypto::sha256(&der);

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.public_key_der == der)
        {
            entry.name = name.to_owned();
            entry.symmetric_key = symmetric_key.to_vec();
            return Ok(());
        }

        self.entries.push(UserEntry {
            name: name.to_owned(),
            public_key_der: der,
            public_key: *public_key,
            commitment: commitment.to_vec(),
            symmetric_key: symmetric_key.to_vec(),
            comments: Vec::new(),
        });
        Ok(())
    }

    /// The entry whose identity key has the given DER encoding.
    pub fn find_by_public_key_der(&self, der: &[u8]) -> Option<&UserEntry> {
        self.entries
            .iter()
            .find(|entry| entry.public_key_der == der)
    }

    pub fn find_by_public_key(&self, public_key: &PublicKey) -> Option<&UserEntry> {
        let der = crypto::public_key_der(public_key).ok()?;
        self.find_by_public_key_der(&der)
    }

    pub fn find_by_commitment(&self, commitment: &[u8]) -> Option<&UserEntry> {
        self.entries
            .iter()
            .find(|entry| entry.commitment == commitment)
    }

    /// Parses store text into this store, appending to any entries already
    /// present. Stops at the first malformed line; everything parsed up to
    /// that point stays in the store and the error describes the rest.
    ///
    /// Every loaded entry is checked for
    /// `commitment = SHA-256(DER(public key))`; a mismatch aborts the load.
    pub fn import(&mut self, text: &str) -> Result<(), UsersError> {
        let had_entries = !self.entries.is_empty();
        let mut pending: Vec<String> = Vec::new();

        for (index, line) in split_lines(text).iter().enumerate() {
            let number = index + 1;
            if is_comment(line) {
                pending.push((*line).to_owned());
                continue;
            }

            let mut entry = parse_user_line(line, number)?;
            if crypto::sha256(&entry.public_key_der).as_slice() != entry.commitment.as_slice() {
                log::warn!("user store: commitment mismatch at line {}", number);
                return Err(UsersError::CommitmentMismatch {
                    line: number,
                    name: entry.name,
                });
            }

            entry.comments = std::mem::take(&mut pending);
            if self.entries.is_empty() && !had_entries {
                // comments above the first entry describe the store itself
                self.header = std::mem::take(&mut entry.comments);
            }
            self.entries.push(entry);
        }

        self.trailing.extend(pending);
        Ok(())
    }

    /// Renders the store in its file format, comments in place. A store
    /// loaded and exported without modification reproduces its file
    /// byte-for-byte.
    pub fn export(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str(line);
            out.push('\n');
        }
        for entry in &self.entries {
            for line in &entry.comments {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        for line in &self.trailing {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn load(path: &Path) -> Result<UserStore, UsersError> {
        let mut store = UserStore::new();
        store.import(&fs::read_to_string(path)?)?;
        log::debug!("loaded {} users from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn store(&self, path: &Path) -> Result<(), UsersError> {
        Ok(fs::write(path, self.export())?)
    }
}

fn parse_user_line(line: &str, number: usize) -> Result<UserEntry, UsersError> {
    let malformed = || UsersError::Format { line: number };

    let fields: Vec<&str> = line.split(':').collect();
    let [name, commitment, public_key, symmetric_key] = fields.as_slice() else {
        return Err(malformed());
    };

    let commitment = BASE64.decode(commitment).map_err(|_| malformed())?;
    if commitment.len() != crypto::SHA256_SIZE {
        return Err(malformed());
    }
    let public_key_der = BASE64.decode(public_key).map_err(|_| malformed())?;
    let public_key = crypto::public_key_from_der(&public_key_der).map_err(|_| malformed())?;
    let symmetric_key = BASE64.decode(symmetric_key).map_err(|_| malformed())?;

    Ok(UserEntry {
        name: (*name).to_owned(),
        public_key_der,
        public_key,
        commitment,
        symmetric_key,
        comments: Vec::new(),
    })
}
