//! User model.
//!
//! Users are keyed by their immutable Telegram id and created on first
//! contact. Display fields are refreshed whenever Telegram reports different
//! values. Users are never deleted; listings and transactions reference them.

use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::users;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub kyc_status: String,
    pub rating: i32,
    pub stripe_account_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: String,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub kyc_status: String,
    pub rating: i32,
}

/// Identity fields as reported by Telegram with an inbound update.
#[derive(Debug, Clone, Default)]
pub struct TelegramProfile {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    pub fn find_by_id(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<User>> {
        use crate::schema::users::dsl;

        let user = dsl::users
            .find(user_id)
            .first::<User>(conn)
            .optional()?;
        Ok(user)
    }

    pub fn find_by_telegram_id(
        conn: &mut SqliteConnection,
        telegram_id: i64,
    ) -> Result<Option<User>> {
        use crate::schema::users::dsl;

        let user = dsl::users
            .filter(dsl::telegram_id.eq(telegram_id))
            .first::<User>(conn)
            .optional()?;
        Ok(user)
    }

    /// Look up a user by Telegram id, creating them on first contact and
    /// refreshing any display fields that changed since last time.
    pub fn find_or_create(
        conn: &mut SqliteConnection,
        telegram_id: i64,
        profile: TelegramProfile,
    ) -> Result<User> {
        use crate::schema::users::dsl;

        match Self::find_by_telegram_id(conn, telegram_id)? {
            None => {
                let new_user = NewUser {
                    id: uuid::Uuid::new_v4().to_string(),
                    telegram_id,
                    username: profile.username,
                    display_name: profile.display_name,
                    first_name: profile.first_name,
                    last_name: profile.last_name,
                    kyc_status: "none".to_string(),
                    rating: 0,
                };

                diesel::insert_into(dsl::users).values(&new_user).execute(conn)?;

                let user = dsl::users.find(&new_user.id).first::<User>(conn)?;
                Ok(user)
            }
            Some(existing) => {
                let changed = existing.username != profile.username
                    || existing.display_name != profile.display_name
                    || existing.first_name != profile.first_name
                    || existing.last_name != profile.last_name;

                if !changed {
                    return Ok(existing);
                }

                diesel::update(dsl::users.filter(dsl::telegram_id.eq(telegram_id)))
                    .set((
                        dsl::username.eq(profile.username),
                        dsl::display_name.eq(profile.display_name),
                        dsl::first_name.eq(profile.first_name),
                        dsl::last_name.eq(profile.last_name),
                        dsl::updated_at.eq(chrono::Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;

                let user = dsl::users
                    .filter(dsl::telegram_id.eq(telegram_id))
                    .first::<User>(conn)?;
                Ok(user)
            }
        }
    }

    /// Display label for messages: display name, falling back to username.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("Anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_pool;

    #[test]
    fn creates_user_on_first_contact() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let user = User::find_or_create(
            &mut conn,
            111,
            TelegramProfile {
                username: Some("alice".into()),
                display_name: Some("Alice".into()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(user.telegram_id, 111);
        assert_eq!(user.kyc_status, "none");
        assert_eq!(user.rating, 0);
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[test]
    fn refreshes_changed_display_fields() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let first = User::find_or_create(
            &mut conn,
            222,
            TelegramProfile {
                username: Some("bob".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let second = User::find_or_create(
            &mut conn,
            222,
            TelegramProfile {
                username: Some("bobby".into()),
                ..Default::default()
            },
        )
        .unwrap();

        // Same row, updated handle
        assert_eq!(first.id, second.id);
        assert_eq!(second.username.as_deref(), Some("bobby"));
    }

    #[test]
    fn label_falls_back_to_username_then_anonymous() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let user = User::find_or_create(&mut conn, 333, TelegramProfile::default()).unwrap();
        assert_eq!(user.label(), "Anonymous");
    }
}
