//! # Row Management
//!
//! The table has a fixed three-column schema: a `u32` primary key plus two
//! zero-padded string columns. Rows serialize to a fixed-width byte layout so
//! they never cross page boundaries and can be addressed by offset arithmetic
//! alone.

use crate::errors::Error;
use std::fmt;

/// Maximum number of content bytes in the `username` column.
pub const COLUMN_USERNAME_SIZE: usize = 32;

/// Maximum number of content bytes in the `email` column.
pub const COLUMN_EMAIL_SIZE: usize = 255;

const ID_SIZE: usize = std::mem::size_of::<u32>();
const USERNAME_SIZE: usize = COLUMN_USERNAME_SIZE + 1;
const EMAIL_SIZE: usize = COLUMN_EMAIL_SIZE + 1;

const ID_OFFSET: usize = 0;
const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

/// Size of a serialized row. Fixed by the on-disk format.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

/// A single record of the fixed `(id, username, email)` schema.
///
/// The string columns are stored as fixed-width, zero-padded byte arrays, the
/// same representation they have on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: u32,
    username: [u8; USERNAME_SIZE],
    email: [u8; EMAIL_SIZE],
}

impl Row {
    /// Validates raw statement arguments and builds a row from them.
    ///
    /// # Errors
    /// - `Error::Schema("ID must be positive.")` for ids below 1.
    /// - `Error::Syntax("Syntax error.")` for ids that do not fit in a `u32`.
    /// - `Error::Schema("String is too long.")` when either string column
    ///   exceeds its byte limit.
    pub fn build(id: i64, username: &str, email: &str) -> Result<Self, Error> {
        if id <= 0 {
            return Err(err!(Schema, "ID must be positive."));
        }
        let id = u32::try_from(id).map_err(|_| err!(Syntax, "Syntax error."))?;
        if username.len() > COLUMN_USERNAME_SIZE || email.len() > COLUMN_EMAIL_SIZE {
            return Err(err!(Schema, "String is too long."));
        }

        let mut row = Row {
            id,
            username: [0; USERNAME_SIZE],
            email: [0; EMAIL_SIZE],
        };
        row.username[..username.len()].copy_from_slice(username.as_bytes());
        row.email[..email.len()].copy_from_slice(email.as_bytes());
        Ok(row)
    }

    /// Encodes the row into its fixed on-disk layout, little-endian id first.
    pub fn serialize(&self) -> [u8; ROW_SIZE] {
        let mut buf = [0u8; ROW_SIZE];
        buf[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE].copy_from_slice(&self.username);
        buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE].copy_from_slice(&self.email);
        buf
    }

    /// Decodes a row from a serialized value slot.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the slice is not exactly [`ROW_SIZE`]
    /// bytes long.
    pub fn deserialize(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != ROW_SIZE {
            return Err(err!(
                Storage,
                "Row size mismatch (expected={}, got={})",
                ROW_SIZE,
                buf.len()
            ));
        }

        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + ID_SIZE]);

        let mut row = Row {
            id: u32::from_le_bytes(id_bytes),
            username: [0; USERNAME_SIZE],
            email: [0; EMAIL_SIZE],
        };
        row.username
            .copy_from_slice(&buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]);
        row.email
            .copy_from_slice(&buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]);
        Ok(row)
    }

    pub fn username(&self) -> String {
        fixed_bytes_to_string(&self.username)
    }

    pub fn email(&self) -> String {
        fixed_bytes_to_string(&self.email)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username(), self.email())
    }
}

/// Interprets a zero-padded column as text, dropping the padding.
fn fixed_bytes_to_string(buf: &[u8]) -> String {
    let content = buf.split(|&b| b == 0).next().unwrap_or(&[]);
    String::from_utf8_lossy(content).to_string()
}
