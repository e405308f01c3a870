use std::{borrow::Cow, error::Error};

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::question::{Category, Question, QuestionRow};
use crate::activity::ClientInfo;

pub(crate) struct Connection {
    pool: PgPool,
}

impl Connection {
    pub(crate) async fn connect<'a>(connection_string: Cow<'a, str>) -> Self {
        let pool = PgPool::connect(&connection_string)
            .await
            .expect("Failed to connect to database");
        Self { pool }
    }

    pub(crate) async fn run_migrations(&self) {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .expect("Migration failed.");
    }
}

pub(crate) type DbError = Box<dyn Error + Send + Sync>;

/// Random fixed-size samples from the question bank. An empty bank yields an
/// empty vector, which callers treat distinctly from a query error.
pub(crate) trait SampleQuestions {
    async fn sample(&self, count: i64) -> Result<Vec<Question>, DbError>;

    async fn sample_by_category(
        &self,
        category: Category,
        count: i64,
    ) -> Result<Vec<Question>, DbError>;
}

/// Durable per-user activity trail: command history and test completions.
pub(crate) trait LogActivity {
    async fn log_command(&self, info: &ClientInfo, command: &str) -> Result<(), DbError>;

    async fn record_test_completion(&self, user_id: i64, score: u32) -> Result<(), DbError>;
}

/// Aggregates over the user trail, consumed by `/stats` and the moderator
/// reports.
pub(crate) trait UserStats {
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, DbError>;

    async fn count_users(&self) -> Result<i64, DbError>;

    async fn count_active_since(&self, cutoff: DateTime<Utc>) -> Result<i64, DbError>;

    async fn sum_tests_completed(&self) -> Result<i64, DbError>;

    async fn distinct_user_ids(&self) -> Result<Vec<i64>, DbError>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UserRecord {
    pub(crate) tests_completed: i32,
    pub(crate) total_score: i32,
    pub(crate) commands_used: i64,
    pub(crate) last_activity: DateTime<Utc>,
    pub(crate) ip_address: String,
}

const QUESTION_COLUMNS: &str = "uuid, prompt, option_a, option_b, option_c, option_d, \
                                correct_index, explanation, study_link, category, difficulty";

impl SampleQuestions for Connection {
    async fn sample(&self, count: i64) -> Result<Vec<Question>, DbError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions ORDER BY random() LIMIT $1"
        ))
        .bind(count)
        .fetch_all(&self.pool)
        .await?;

        decode_questions(rows)
    }

    async fn sample_by_category(
        &self,
        category: Category,
        count: i64,
    ) -> Result<Vec<Question>, DbError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE category = $1 \
             ORDER BY random() LIMIT $2"
        ))
        .bind(category.as_str())
        .bind(count)
        .fetch_all(&self.pool)
        .await?;

        decode_questions(rows)
    }
}

fn decode_questions(rows: Vec<QuestionRow>) -> Result<Vec<Question>, DbError> {
    let questions = rows
        .into_iter()
        .map(Question::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    for question in &questions {
        log::debug!(
            "sampled question {} [{} / {}]",
            question.uuid(),
            question.category(),
            question.difficulty()
        );
    }
    Ok(questions)
}

impl LogActivity for Connection {
    async fn log_command(&self, info: &ClientInfo, command: &str) -> Result<(), DbError> {
        log::debug!("Creating transaction");
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO user_sessions (user_id, username, first_name, last_name, ip_address, last_activity) \
             VALUES ($1, $2, $3, $4, $5, now()) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 username = EXCLUDED.username, \
                 first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, \
                 ip_address = EXCLUDED.ip_address, \
                 last_activity = now()",
        )
        .bind(info.user_id as i64)
        .bind(&info.username)
        .bind(&info.first_name)
        .bind(&info.last_name)
        .bind(&info.pseudo_ip)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO command_log (uuid, user_id, command, ip_address) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(info.user_id as i64)
        .bind(command)
        .bind(&info.pseudo_ip)
        .execute(&mut *tx)
        .await?;

        log::debug!("Closing transaction");
        tx.commit().await?;
        Ok(())
    }

    async fn record_test_completion(&self, user_id: i64, score: u32) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO user_sessions (user_id, tests_completed, total_score) \
             VALUES ($1, 1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 tests_completed = user_sessions.tests_completed + 1, \
                 total_score = user_sessions.total_score + EXCLUDED.total_score, \
                 last_activity = now()",
        )
        .bind(user_id)
        .bind(score as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl UserStats for Connection {
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, DbError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.tests_completed, u.total_score, u.last_activity, u.ip_address, \
                    (SELECT COUNT(*) FROM command_log c WHERE c.user_id = u.user_id) AS commands_used \
             FROM user_sessions u WHERE u.user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn count_users(&self) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_active_since(&self, cutoff: DateTime<Utc>) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_sessions WHERE last_activity >= $1",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn sum_tests_completed(&self) -> Result<i64, DbError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(tests_completed), 0)::BIGINT FROM user_sessions",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn distinct_user_ids(&self) -> Result<Vec<i64>, DbError> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT user_id FROM user_sessions")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
