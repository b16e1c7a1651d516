//! Owner registry repository.

use std::sync::Arc;

use crate::models::owner::{KnownLocation, Owner};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_ts, encode_ts};

/// Repository wrapper around `SQLite` for owners.
#[derive(Clone)]
pub struct OwnerRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct OwnerRow {
    id: String,
    transport_chat_id: String,
    display_name: Option<String>,
    home_location: Option<String>,
    created_at: String,
}

impl OwnerRow {
    fn into_owner(self) -> Result<Owner> {
        let home_location = self
            .home_location
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid home_location: {e}")))?;
        Ok(Owner {
            id: self.id,
            transport_chat_id: self.transport_chat_id,
            display_name: self.display_name,
            home_location,
            created_at: decode_ts(&self.created_at, "created_at")?,
        })
    }
}

impl OwnerRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Find the owner for a transport chat, registering them on first contact.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert or lookup fails.
    pub async fn get_or_create(&self, transport_chat_id: &str) -> Result<Owner> {
        let fresh = Owner::new(transport_chat_id.to_owned());
        sqlx::query(
            "INSERT OR IGNORE INTO owner (id, transport_chat_id, display_name, home_location,
             created_at) VALUES (?1, ?2, NULL, NULL, ?3)",
        )
        .bind(&fresh.id)
        .bind(transport_chat_id)
        .bind(encode_ts(fresh.created_at))
        .execute(self.db.as_ref())
        .await?;

        self.get_by_chat(transport_chat_id)
            .await?
            .ok_or_else(|| AppError::Db(format!("owner for chat {transport_chat_id} vanished")))
    }

    /// Look up an owner by ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Owner>> {
        let row: Option<OwnerRow> = sqlx::query_as("SELECT * FROM owner WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(OwnerRow::into_owner).transpose()
    }

    /// Look up an owner by transport chat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_chat(&self, transport_chat_id: &str) -> Result<Option<Owner>> {
        let row: Option<OwnerRow> =
            sqlx::query_as("SELECT * FROM owner WHERE transport_chat_id = ?1")
                .bind(transport_chat_id)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(OwnerRow::into_owner).transpose()
    }

    /// Remember the owner's last resolved location.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the update fails.
    pub async fn set_home_location(&self, id: &str, location: &KnownLocation) -> Result<()> {
        let encoded = serde_json::to_string(location)
            .map_err(|e| AppError::Db(format!("serialize home_location: {e}")))?;
        sqlx::query("UPDATE owner SET home_location = ?1 WHERE id = ?2")
            .bind(encoded)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}
