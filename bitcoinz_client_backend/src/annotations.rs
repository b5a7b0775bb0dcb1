//! User-local annotations that are independent of chain state.
//!
//! Memo read flags, address labels, message labels and the address book are never sent to
//! the engine. They live in an [`Annotations`] value that can be persisted as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use bitcoinz_protocol::TxId;

use crate::wallet::{AddressLabel, Contact, MessageLabel};

/// Errors that can occur while editing or persisting annotations.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Annotation storage error: {0}")]
    Io(#[from] io::Error),
    #[error("Annotation file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
    #[error("A contact for {0} already exists")]
    DuplicateContact(String),
    #[error("No contact for {0}")]
    UnknownContact(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    memo_read: BTreeMap<TxId, bool>,
    address_labels: Vec<AddressLabel>,
    message_labels: Vec<MessageLabel>,
    contacts: Vec<Contact>,
}

impl Annotations {
    /// Reads annotations from `path`. A missing file yields empty annotations.
    pub fn load(path: &Path) -> Result<Self, AnnotationError> {
        match fs::read_to_string(path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No annotations at {}; starting empty", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes annotations to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), AnnotationError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Returns the stored read flag for a memo, if one was ever set.
    pub fn memo_read_status(&self, txid: &TxId) -> Option<bool> {
        self.memo_read.get(txid).copied()
    }

    /// Returns the read flag for a memo, or `fallback` if it was never set.
    pub fn is_memo_read(&self, txid: &TxId, fallback: bool) -> bool {
        self.memo_read_status(txid).unwrap_or(fallback)
    }

    /// Sets the read flag for a memo, returning whether the stored value changed.
    pub fn set_memo_read(&mut self, txid: TxId, read: bool) -> bool {
        self.memo_read.insert(txid, read) != Some(read)
    }

    pub fn message_labels(&self, txid: &TxId) -> Vec<MessageLabel> {
        self.message_labels
            .iter()
            .filter(|l| &l.txid == txid)
            .cloned()
            .collect()
    }

    /// Adds a label to a message. A label with the same name on the same message is
    /// replaced. Returns `false` if an identical label was already present.
    pub fn add_message_label(&mut self, label: MessageLabel) -> bool {
        match self
            .message_labels
            .iter_mut()
            .find(|l| l.txid == label.txid && l.name == label.name)
        {
            Some(existing) if *existing == label => false,
            Some(existing) => {
                *existing = label;
                true
            }
            None => {
                self.message_labels.push(label);
                true
            }
        }
    }

    /// Removes the named label from a message, returning whether it existed.
    pub fn remove_message_label(&mut self, txid: &TxId, name: &str) -> bool {
        let before = self.message_labels.len();
        self.message_labels
            .retain(|l| !(&l.txid == txid && l.name == name));
        self.message_labels.len() != before
    }

    pub fn address_labels(&self) -> &[AddressLabel] {
        &self.address_labels
    }

    pub fn address_label(&self, address: &str) -> Option<&AddressLabel> {
        self.address_labels.iter().find(|l| l.address == address)
    }

    /// Sets the label of an address, replacing any previous label for it.
    pub fn set_address_label(&mut self, label: AddressLabel) {
        match self
            .address_labels
            .iter_mut()
            .find(|l| l.address == label.address)
        {
            Some(existing) => *existing = label,
            None => self.address_labels.push(label),
        }
    }

    pub fn remove_address_label(&mut self, address: &str) -> bool {
        let before = self.address_labels.len();
        self.address_labels.retain(|l| l.address != address);
        self.address_labels.len() != before
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn favorite_contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().filter(|c| c.favorite)
    }

    pub fn find_contact(&self, address: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.address == address)
    }

    /// Adds a contact. Each address may appear in the address book once.
    pub fn add_contact(&mut self, contact: Contact) -> Result<(), AnnotationError> {
        if self.find_contact(&contact.address).is_some() {
            return Err(AnnotationError::DuplicateContact(contact.address));
        }
        self.contacts.push(contact);
        Ok(())
    }

    /// Replaces the contact stored under `address`.
    pub fn update_contact(
        &mut self,
        address: &str,
        contact: Contact,
    ) -> Result<(), AnnotationError> {
        if contact.address != address && self.find_contact(&contact.address).is_some() {
            return Err(AnnotationError::DuplicateContact(contact.address));
        }
        let existing = self
            .contacts
            .iter_mut()
            .find(|c| c.address == address)
            .ok_or_else(|| AnnotationError::UnknownContact(address.to_string()))?;
        *existing = contact;
        Ok(())
    }

    pub fn remove_contact(&mut self, address: &str) -> bool {
        let before = self.contacts.len();
        self.contacts.retain(|c| c.address != address);
        self.contacts.len() != before
    }

    pub fn set_favorite(&mut self, address: &str, favorite: bool) -> Result<(), AnnotationError> {
        let contact = self
            .contacts
            .iter_mut()
            .find(|c| c.address == address)
            .ok_or_else(|| AnnotationError::UnknownContact(address.to_string()))?;
        contact.favorite = favorite;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    use bitcoinz_protocol::TxId;

    use super::{AnnotationError, Annotations};
    use crate::wallet::{AddressLabel, Contact, MessageLabel};

    const T_ADDR: &str = "t1XgfkH3GVD2Yv8kAn8RkSeLiPXWSpcqy4M";
    const Z_ADDR: &str =
        "zs1m2l5e9c4h6mjq0cfvx7k0ym6p9k5w0d2pq0u3d5u2tqyqvfz9u5x3xj7t9l4pz0uf6t8y9qlwnf";

    fn label(txid: TxId, name: &str, color: &str) -> MessageLabel {
        MessageLabel {
            txid,
            name: name.into(),
            color: color.into(),
        }
    }

    #[test]
    fn memo_read_flags() {
        let mut a = Annotations::default();
        let txid = TxId::from_bytes([1; 32]);
        assert!(a.is_memo_read(&txid, true));
        assert!(!a.is_memo_read(&txid, false));

        assert!(a.set_memo_read(txid, false));
        assert!(!a.set_memo_read(txid, false));
        assert!(!a.is_memo_read(&txid, true));
        assert!(a.set_memo_read(txid, true));
        assert_eq!(a.memo_read_status(&txid), Some(true));
    }

    #[test]
    fn message_labels_by_txid() {
        let mut a = Annotations::default();
        let t1 = TxId::from_bytes([1; 32]);
        let t2 = TxId::from_bytes([2; 32]);

        assert!(a.add_message_label(label(t1, "rent", "#ff0000")));
        assert!(!a.add_message_label(label(t1, "rent", "#ff0000")));
        assert!(a.add_message_label(label(t1, "rent", "#00ff00")));
        assert!(a.add_message_label(label(t2, "rent", "#0000ff")));

        assert_eq!(a.message_labels(&t1), vec![label(t1, "rent", "#00ff00")]);
        assert!(a.remove_message_label(&t1, "rent"));
        assert!(!a.remove_message_label(&t1, "rent"));
        assert!(a.message_labels(&t1).is_empty());
        assert_eq!(a.message_labels(&t2).len(), 1);
    }

    #[test]
    fn address_labels_replace() {
        let mut a = Annotations::default();
        let mut l = AddressLabel {
            address: T_ADDR.into(),
            name: "Savings".into(),
            color: "#123456".into(),
            category: "personal".into(),
            is_owned: true,
        };
        a.set_address_label(l.clone());
        l.name = "Cold".into();
        a.set_address_label(l.clone());
        assert_eq!(a.address_labels(), &[l]);
        assert!(a.remove_address_label(T_ADDR));
        assert!(a.address_label(T_ADDR).is_none());
    }

    #[test]
    fn contacts_crud() {
        let mut a = Annotations::default();
        a.add_contact(Contact::new("Alice", T_ADDR).unwrap()).unwrap();
        assert_matches!(
            a.add_contact(Contact::new("Alice again", T_ADDR).unwrap()),
            Err(AnnotationError::DuplicateContact(_))
        );

        a.set_favorite(T_ADDR, true).unwrap();
        assert_eq!(a.favorite_contacts().count(), 1);

        a.update_contact(T_ADDR, Contact::new("Alice Z", Z_ADDR).unwrap())
            .unwrap();
        assert!(a.find_contact(T_ADDR).is_none());
        assert!(!a.find_contact(Z_ADDR).unwrap().is_transparent);

        assert_matches!(
            a.set_favorite(T_ADDR, true),
            Err(AnnotationError::UnknownContact(_))
        );
        assert!(a.remove_contact(Z_ADDR));
        assert!(a.contacts().is_empty());
    }

    #[test]
    fn persistence_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("annotations.json");

        assert_eq!(Annotations::load(&path).unwrap(), Annotations::default());

        let mut a = Annotations::default();
        a.set_memo_read(TxId::from_bytes([9; 32]), true);
        a.add_message_label(label(TxId::from_bytes([9; 32]), "gift", "#abcdef"));
        a.add_contact(Contact::new("Bob", Z_ADDR).unwrap()).unwrap();
        a.save(&path).unwrap();

        assert_eq!(Annotations::load(&path).unwrap(), a);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_matches!(Annotations::load(&path), Err(AnnotationError::Json(_)));
    }
}
