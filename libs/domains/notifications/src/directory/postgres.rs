use super::{EventDirectory, RecipientResolver, UserDirectory};
use crate::error::NotificationResult;
use crate::models::{CategoryId, EventId, EventSnapshot, UserContact, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DbBackend, FromQueryResult, Statement, Value};
use tracing::debug;

/// Directory backed by the events Postgres database
#[derive(Clone)]
pub struct PgDirectory {
    db: sea_orm::DatabaseConnection,
}

impl PgDirectory {
    pub fn new(db: sea_orm::DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct SubscriberRow {
    user_id: i64,
}

#[derive(Debug, FromQueryResult)]
struct UserRow {
    id: i64,
    email: String,
    preferred_language: String,
}

impl From<UserRow> for UserContact {
    fn from(row: UserRow) -> Self {
        UserContact {
            id: row.id,
            email: row.email,
            preferred_language: row.preferred_language,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct EventRow {
    id: i64,
    title: String,
    description: Option<String>,
    date_time: DateTime<Utc>,
}

#[derive(Debug, FromQueryResult)]
struct CategoryRow {
    category_id: i64,
}

/// `$1, $2, ...` for an IN list of `count` values
fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl RecipientResolver for PgDirectory {
    async fn subscribers_of(&self, category_ids: &[CategoryId]) -> NotificationResult<Vec<UserId>> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT DISTINCT user_id::bigint AS user_id
            FROM user_categories
            WHERE category_id IN ({})
            ORDER BY user_id
            "#,
            placeholders(category_ids.len())
        );
        let values: Vec<Value> = category_ids.iter().map(|&id| id.into()).collect();
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);

        let rows = SubscriberRow::find_by_statement(stmt).all(&self.db).await?;
        debug!(categories = ?category_ids, subscribers = rows.len(), "Resolved subscribers");

        Ok(rows.into_iter().map(|row| row.user_id).collect())
    }
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn find_user(&self, id: UserId) -> NotificationResult<Option<UserContact>> {
        let sql = r#"
            SELECT id::bigint AS id, email, COALESCE(preferred_language, 'en') AS preferred_language
            FROM users
            WHERE id = $1
        "#;
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [id.into()]);

        let row = UserRow::find_by_statement(stmt).one(&self.db).await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl EventDirectory for PgDirectory {
    async fn find_event(&self, id: EventId) -> NotificationResult<Option<EventSnapshot>> {
        let sql = r#"
            SELECT id::bigint AS id, title, description, date_time::timestamptz AS date_time
            FROM events
            WHERE id = $1
        "#;
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [id.into()]);

        let Some(row) = EventRow::find_by_statement(stmt).one(&self.db).await? else {
            return Ok(None);
        };

        let sql = r#"
            SELECT category_id::bigint AS category_id
            FROM event_categories
            WHERE event_id = $1
            ORDER BY category_id
        "#;
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [id.into()]);
        let categories = CategoryRow::find_by_statement(stmt).all(&self.db).await?;

        Ok(Some(EventSnapshot {
            id: row.id,
            title: row.title,
            description: row.description,
            date_time: row.date_time,
            category_ids: categories.into_iter().map(|c| c.category_id).collect(),
            location: None,
        }))
    }
}
