use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::{is_comment, split_lines, UsersError};

// a colon-separated MAC address is always this long
const MAC_LENGTH: usize = 17;

/// One known Bluetooth device: its colon-separated MAC address and,
/// optionally, the commitment of the service key it was paired with.
#[derive(Debug, Clone)]
pub struct Beacon {
    address: String,
    commitment_base64: Option<String>,
    comments: Vec<String>,
}

impl Beacon {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn commitment(&self) -> Option<Vec<u8>> {
        self.commitment_base64
            .as_ref()
            .and_then(|encoded| BASE64.decode(encoded).ok())
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    fn to_line(&self) -> String {
        match &self.commitment_base64 {
            Some(commitment) => format!("{}:{}", self.address, commitment),
            None => self.address.clone(),
        }
    }
}

/// The beacons file: one device per line,
/// `XX:XX:XX:XX:XX:XX[:<base64 commitment>]`, with the same comment
/// discipline as the user store.
#[derive(Debug, Clone, Default)]
pub struct Beacons {
    header: Vec<String>,
    entries: Vec<Beacon>,
    trailing: Vec<String>,
}

impl Beacons {
    pub fn new() -> Self {
        Beacons::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Beacon> {
        self.entries.iter()
    }

    pub fn add_device(&mut self, address: &str, commitment: Option<&[u8]>) -> Result<(), UsersError> {
        if !valid_mac(address) {
            return Err(UsersError::BadAddress(address.to_owned()));
        }
        if self
            .entries
            .iter()
            .any(|entry| entry.address.eq_ignore_ascii_case(address))
        {
            return Ok(());
        }
        self.entries.push(Beacon {
            address: address.to_owned(),
            commitment_base64: commitment.map(|bytes| BASE64.encode(bytes)),
            comments: Vec::new(),
        });
        Ok(())
    }

    pub fn import(&mut self, text: &str) -> Result<(), UsersError> {
        let mut pending: Vec<String> = Vec::new();
        let had_entries = !self.entries.is_empty();

        for (index, line) in split_lines(text).iter().enumerate() {
            let number = index + 1;
            if is_comment(line) {
                pending.push((*line).to_owned());
                continue;
            }

            let mut beacon = parse_beacon_line(line, number)?;
            beacon.comments = std::mem::take(&mut pending);
            if self.entries.is_empty() && !had_entries {
                self.header = std::mem::take(&mut beacon.comments);
            }
            self.entries.push(beacon);
        }

        self.trailing.extend(pending);
        Ok(())
    }

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

    pub fn load(path: &Path) -> Result<Beacons, UsersError> {
        let mut beacons = Beacons::new();
        beacons.import(&fs::read_to_string(path)?)?;
        log::debug!("loaded {} beacons from {}", beacons.len(), path.display());
        Ok(beacons)
    }

    pub fn store(&self, path: &Path) -> Result<(), UsersError> {
        Ok(fs::write(path, self.export())?)
    }
}

fn valid_mac(address: &str) -> bool {
    if address.len() != MAC_LENGTH {
        return false;
    }
    address.split(':').count() == 6
        && address
            .split(':')
            .all(|group| group.len() == 2 && group.chars().all(|c| c.is_ascii_hexdigit()))
}

fn parse_beacon_line(line: &str, number: usize) -> Result<Beacon, UsersError> {
    let malformed = || UsersError::Format { line: number };

    if line.len() < MAC_LENGTH || !valid_mac(&line[..MAC_LENGTH]) {
        return Err(malformed());
    }
    let commitment = match line[MAC_LENGTH..].strip_prefix(':') {
        Some(rest) => {
            let decoded = BASE64.decode(rest).map_err(|_| malformed())?;
            if decoded.len() != crypto::SHA256_SIZE {
                return Err(malformed());
            }
            Some(rest.to_owned())
        }
        None if line.len() == MAC_LENGTH => None,
        None => return Err(malformed()),
    };

    Ok(Beacon {
        address: line[..MAC_LENGTH].to_owned(),
        commitment_base64: commitment,
        comments: Vec::new(),
    })
}
