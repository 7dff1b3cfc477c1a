//! Article and user store on SQLite.
//!
//! The pipeline bulk-inserts through [`ArticleStore::bulk_insert`]; the API
//! reads and writes single rows through the remaining methods. Both share one
//! pool and rely on SQLite transactions alone, with no extra locking.

use crate::models::{Article, ArticleUpdate, NormalizedArticle, User};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{info, instrument};

const ARTICLE_COLUMNS: &str = "id, title, image, journal, url, view, publish_date";

/// Rows per INSERT statement; keeps each statement under SQLite's bind limit.
const BULK_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    /// Open (creating if needed) the database at `database_url` and make sure
    /// the schema exists.
    #[instrument(level = "info")]
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            // Every connection to `:memory:` is a separate database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(5);
        }
        let pool = pool_options.connect_with(options).await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        info!("Article store ready");
        Ok(store)
    }

    /// A private in-memory store.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:").await
    }

    async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                image TEXT NOT NULL,
                journal TEXT NOT NULL,
                url TEXT NOT NULL,
                view INTEGER NOT NULL,
                publish_date TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_article_publish_date ON article(publish_date);
            CREATE INDEX IF NOT EXISTS idx_article_journal ON article(journal);
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert every article in one transaction.
    ///
    /// No duplicate check is made: inserting the same batch twice stores it
    /// twice. An empty batch commits an empty transaction.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn bulk_insert(&self, articles: &[NormalizedArticle]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in articles.chunks(BULK_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO article (title, image, journal, url, view, publish_date) ",
            );
            builder.push_values(chunk, |mut row, article| {
                row.push_bind(&article.title)
                    .push_bind(&article.image)
                    .push_bind(&article.journal)
                    .push_bind(&article.url)
                    .push_bind(article.view)
                    .push_bind(article.publish_date);
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        info!(inserted, "Bulk insert committed");
        Ok(inserted)
    }

    /// Articles published on `date`, most viewed first.
    pub async fn rank_by_date(&self, date: NaiveDate, limit: i64) -> Result<Vec<Article>, sqlx::Error> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM article WHERE publish_date = ? \
             ORDER BY view DESC, id ASC LIMIT ?"
        ))
        .bind(date)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Articles of one journal published on `date`, most viewed first.
    pub async fn rank_by_date_and_journal(
        &self,
        date: NaiveDate,
        journal: &str,
        limit: i64,
    ) -> Result<Vec<Article>, sqlx::Error> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM article WHERE publish_date = ? AND journal = ? \
             ORDER BY view DESC, id ASC LIMIT ?"
        ))
        .bind(date)
        .bind(journal)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// The most viewed article of each journal on `date`.
    ///
    /// Ties on view count go to the earliest inserted row, so each journal
    /// yields exactly one article.
    pub async fn top_per_journal(&self, date: NaiveDate) -> Result<Vec<Article>, sqlx::Error> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM ( \
                SELECT {ARTICLE_COLUMNS}, ROW_NUMBER() OVER ( \
                    PARTITION BY journal ORDER BY view DESC, id ASC \
                ) AS journal_rank \
                FROM article WHERE publish_date = ? \
             ) WHERE journal_rank = 1 \
             ORDER BY view DESC, journal ASC"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
    }

    /// Substring search over title, journal and publish date.
    pub async fn search(&self, keyword: &str, limit: i64) -> Result<Vec<Article>, sqlx::Error> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM article \
             WHERE title LIKE '%' || ?1 || '%' \
                OR journal LIKE '%' || ?1 || '%' \
                OR publish_date LIKE '%' || ?1 || '%' \
             ORDER BY publish_date DESC, view DESC, id ASC LIMIT ?2"
        ))
        .bind(keyword)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Article>, sqlx::Error> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM article WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Whether an article with the same title, journal and date exists.
    pub async fn exists(
        &self,
        title: &str,
        journal: &str,
        date: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM article WHERE title = ? AND journal = ? AND publish_date = ?",
        )
        .bind(title)
        .bind(journal)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn insert(&self, article: &NormalizedArticle) -> Result<Article, sqlx::Error> {
        let id = sqlx::query(
            "INSERT INTO article (title, image, journal, url, view, publish_date) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&article.title)
        .bind(&article.image)
        .bind(&article.journal)
        .bind(&article.url)
        .bind(article.view)
        .bind(article.publish_date)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Article {
            id,
            title: article.title.clone(),
            image: article.image.clone(),
            journal: article.journal.clone(),
            url: article.url.clone(),
            view: article.view,
            publish_date: article.publish_date,
        })
    }

    /// Apply `update` to article `id`. `None` when no such article exists.
    pub async fn update(&self, id: i64, update: &ArticleUpdate) -> Result<Option<Article>, sqlx::Error> {
        let affected = sqlx::query(
            "UPDATE article SET image = COALESCE(?, image), url = COALESCE(?, url) WHERE id = ?",
        )
        .bind(update.image.as_deref())
        .bind(update.url.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Delete article `id`; `false` when it did not exist.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let affected = sqlx::query("DELETE FROM article WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    #[cfg(test)]
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM article")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: i64,
    ) -> Result<User, sqlx::Error> {
        let id = sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, ?)")
            .bind(username)
            .bind(password_hash)
            .bind(role)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(User {
            id,
            username: username.to_string(),
            password: password_hash.to_string(),
            role,
        })
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, password, role FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Make SQLite abort any insert of an article titled `title`.
    pub(crate) async fn reject_title(store: &ArticleStore, title: &str) {
        sqlx::query(&format!(
            "CREATE TRIGGER reject_title BEFORE INSERT ON article \
             WHEN NEW.title = '{title}' \
             BEGIN SELECT RAISE(ABORT, 'rejected by test trigger'); END"
        ))
        .execute(&store.pool)
        .await
        .unwrap();
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 9, 1).unwrap()
    }

    fn article(title: &str, journal: &str, view: i64) -> NormalizedArticle {
        NormalizedArticle {
            title: title.to_string(),
            image: "https://img/x.jpg".to_string(),
            journal: journal.to_string(),
            url: format!("https://n.news.naver.com/{title}"),
            view,
            publish_date: date(),
        }
    }

    #[tokio::test]
    async fn test_bulk_insert_twice_doubles_rows() {
        let store = ArticleStore::in_memory().await.unwrap();
        let batch = vec![article("A", "J1", 10), article("B", "J1", 5)];

        assert_eq!(store.bulk_insert(&batch).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.bulk_insert(&batch).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_bulk_insert_empty_batch() {
        let store = ArticleStore::in_memory().await.unwrap();
        assert_eq!(store.bulk_insert(&[]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_insert_spans_chunks() {
        let store = ArticleStore::in_memory().await.unwrap();
        let batch: Vec<_> = (0..(BULK_CHUNK as i64 + 3))
            .map(|i| article(&format!("T{i}"), "J", i))
            .collect();
        assert_eq!(store.bulk_insert(&batch).await.unwrap(), batch.len() as u64);
        assert_eq!(store.count().await.unwrap(), batch.len() as i64);
    }

    #[tokio::test]
    async fn test_bulk_insert_failure_rolls_back_whole_batch() {
        let store = ArticleStore::in_memory().await.unwrap();
        reject_title(&store, "bad").await;
        let mut batch: Vec<_> = (0..(BULK_CHUNK as i64 + 100))
            .map(|i| article(&format!("T{i}"), "J", i))
            .collect();
        batch.push(article("bad", "J", 1));

        assert!(store.bulk_insert(&batch).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);

        batch.pop();
        assert_eq!(store.bulk_insert(&batch).await.unwrap(), batch.len() as u64);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let store = ArticleStore::in_memory().await.unwrap();
        store.create_user("reader", "$2b$04$hash", 0).await.unwrap();
        let err = store.create_user("reader", "$2b$04$other", 0).await.unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(db) if db.is_unique_violation()));
    }

    #[tokio::test]
    async fn test_rank_by_date_orders_by_view() {
        let store = ArticleStore::in_memory().await.unwrap();
        store
            .bulk_insert(&[article("A", "J", 10), article("B", "J", 5), article("C", "J", 20)])
            .await
            .unwrap();

        let ranked = store.rank_by_date(date(), 10).await.unwrap();
        let views: Vec<i64> = ranked.iter().map(|a| a.view).collect();
        assert_eq!(views, vec![20, 10, 5]);

        let other_day = NaiveDate::from_ymd_opt(2023, 9, 2).unwrap();
        assert!(store.rank_by_date(other_day, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rank_by_date_and_journal() {
        let store = ArticleStore::in_memory().await.unwrap();
        store
            .bulk_insert(&[article("A", "J1", 10), article("B", "J2", 50), article("C", "J1", 30)])
            .await
            .unwrap();
        let ranked = store.rank_by_date_and_journal(date(), "J1", 10).await.unwrap();
        let titles: Vec<&str> = ranked.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A"]);
    }

    #[tokio::test]
    async fn test_top_per_journal_one_each() {
        let store = ArticleStore::in_memory().await.unwrap();
        store
            .bulk_insert(&[
                article("A", "J1", 10),
                article("B", "J1", 40),
                article("C", "J2", 7),
                article("D", "J2", 3),
                article("E", "J2", 7),
            ])
            .await
            .unwrap();

        let top = store.top_per_journal(date()).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].journal.as_str(), top[0].title.as_str()), ("J1", "B"));
        assert_eq!((top[1].journal.as_str(), top[1].title.as_str()), ("J2", "C"));
    }

    #[tokio::test]
    async fn test_search_matches_title_journal_and_date() {
        let store = ArticleStore::in_memory().await.unwrap();
        store
            .bulk_insert(&[article("경제 전망", "한국경제", 1), article("스포츠", "연합뉴스", 2)])
            .await
            .unwrap();

        assert_eq!(store.search("전망", 10).await.unwrap().len(), 1);
        assert_eq!(store.search("연합", 10).await.unwrap()[0].title, "스포츠");
        assert_eq!(store.search("2023-09", 10).await.unwrap().len(), 2);
        assert!(store.search("없음", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_row_crud() {
        let store = ArticleStore::in_memory().await.unwrap();
        let created = store.insert(&article("A", "J", 1)).await.unwrap();
        assert_eq!(store.get(created.id).await.unwrap(), Some(created.clone()));
        assert!(store.exists("A", "J", date()).await.unwrap());
        assert!(!store.exists("A", "Other", date()).await.unwrap());

        let update = ArticleUpdate {
            image: Some("https://img/new.jpg".into()),
            url: None,
        };
        let updated = store.update(created.id, &update).await.unwrap().unwrap();
        assert_eq!(updated.image, "https://img/new.jpg");
        assert_eq!(updated.url, created.url);
        assert_eq!(store.update(9999, &update).await.unwrap(), None);

        assert!(store.delete(created.id).await.unwrap());
        assert!(!store.delete(created.id).await.unwrap());
        assert_eq!(store.get(created.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_users() {
        let store = ArticleStore::in_memory().await.unwrap();
        let user = store.create_user("admin", "$2b$04$hash", 1).await.unwrap();
        let found = store.find_user("admin").await.unwrap().unwrap();
        assert_eq!(found, user);
        assert!(store.find_user("nobody").await.unwrap().is_none());
        assert!(store.create_user("admin", "x", 0).await.is_err());
    }
}
