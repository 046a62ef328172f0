//! Learner profile analytics.
//!
//! Small set of canned queries over the per-learner activity table, plus
//! the prompt that turns a learner's history into a plan recommendation.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::chat::ChatClient;
use crate::error::{ChatError, QueryError};

use super::QueryClient;

/// Characters allowed in values interpolated into SQL text. Anything
/// else never gets near a statement.
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:@-]+$").unwrap());

/// Canned analytics over the learner activity table.
pub struct ProfileQueries {
    query: QueryClient,
}

impl ProfileQueries {
    pub fn new(query: QueryClient) -> Self {
        Self { query }
    }

    /// How many documents of each type a learner has worked through.
    pub async fn document_type_counts(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, u64>, QueryError> {
        let user_id = valid_identifier(user_id)?;
        let config = self.query.config();
        let results = self
            .query
            .execute(counts_sql(&config.database, &config.table, user_id))
            .await?;

        let mut counts = HashMap::new();
        for row in &results.rows {
            let doc_type = cell(row, 0)?;
            let count = cell(row, 1)?
                .parse::<u64>()
                .map_err(|e| QueryError::Malformed(format!("count column: {e}")))?;
            counts.insert(doc_type.to_string(), count);
        }
        debug!(user_id, types = counts.len(), "loaded document type counts");
        Ok(counts)
    }

    /// Every learner id present in the activity table.
    pub async fn list_user_ids(&self) -> Result<Vec<String>, QueryError> {
        let config = self.query.config();
        let results = self
            .query
            .execute(distinct_users_sql(&config.database, &config.table))
            .await?;
        results
            .rows
            .iter()
            .map(|row| cell(row, 0).map(str::to_string))
            .collect()
    }

    /// Ask the assistant to pick a learning plan for a learner from their
    /// history and explain the choice.
    pub async fn explain_customization(
        &self,
        chat: &ChatClient,
        user_name: &str,
        learning_data: &HashMap<String, u64>,
        model: &str,
    ) -> Result<String, ChatError> {
        let history = serde_json::to_string_pretty(learning_data)
            .map_err(|e| ChatError::Request(format!("failed to encode learning history: {e}")))?;
        debug!(user_name, "generating customization explanation");
        let reply = chat
            .send_with_model(&customization_prompt(user_name, &history), model)
            .await?;
        Ok(reply.content)
    }
}

fn counts_sql(database: &str, table: &str, user_id: &str) -> String {
    format!(
        "SELECT document_type, COUNT(document_type) as count \
         FROM \"{database}\".\"{table}\" \
         WHERE user_id = '{user_id}' \
         GROUP BY document_type"
    )
}

fn distinct_users_sql(database: &str, table: &str) -> String {
    format!("SELECT DISTINCT user_id FROM \"{database}\".\"{table}\"")
}

fn customization_prompt(user_name: &str, history: &str) -> String {
    format!(
        "You are an assistant which provides personalized content for users of an online \
         learning platform. You tailor your content to match a user's preferences.\n\n\
         You can decide what learning style (AKA \"learning plan\") a user should be put on. \
         You should decide what plan to put a user on in accordance with their past learning \
         behavior. The following learning plans are available:\n\
         1. \"Provide technical explanations\"\n\
         2. \"Provide explanations in simple language.\"\n\n\
         You should decide what plan to put a learner on, and give 1-2 sentences explaining \
         your decision.\n\n\
         A good response looks like this: \"I put {user_name} on plan <selected-plan/>. \
         I chose to do this because I see that {user_name}'s learning history <explanation/>\"\n\n\
         For user {user_name}, please use their past learning history and select a learning \
         plan, and explain your choice. Their past learning history is as follows: \
         <history>{history}</history>"
    )
}

fn valid_identifier(raw: &str) -> Result<&str, QueryError> {
    if IDENTIFIER.is_match(raw) {
        Ok(raw)
    } else {
        Err(QueryError::InvalidIdentifier(raw.to_string()))
    }
}

fn cell(row: &[String], index: usize) -> Result<&str, QueryError> {
    row.get(index)
        .map(String::as_str)
        .ok_or_else(|| QueryError::Malformed(format!("row is missing column {index}")))
}
