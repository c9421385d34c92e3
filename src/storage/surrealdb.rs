//! SurrealDB 轮次存储
//!
//! 父子链接的校验与修改放在同一个 SurrealQL 事务里完成，
//! 前置条件不满足时以 `THROW` 中止事务，错误前缀再映射回 `AppError`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{Any, connect},
    opt::auth::Root,
};
use tracing::{debug, warn};

use crate::config::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::models::turn::{AttachMode, Turn};
use crate::storage::repository::TurnStore;

const SCHEMA: &str = "
    DEFINE TABLE IF NOT EXISTS turn SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS turn_id_idx ON TABLE turn FIELDS turn_id UNIQUE;
    DEFINE INDEX IF NOT EXISTS turn_owner_idx ON TABLE turn FIELDS owner;
";

const FIELDS: &str = "turn_id, parent_id, primary_child_id, branched_child_ids, \
                      human_text, bot_text, model, owner, created_at";

const CREATE_ROOT: &str = "CREATE turn CONTENT $record RETURN NONE;";

const CREATE_CHILD: &str = "
    BEGIN TRANSACTION;
    LET $parent = (SELECT owner FROM turn WHERE turn_id = $parent_id)[0];
    IF !$parent { THROW 'not_found: ' + $parent_id; };
    IF $parent.owner != $owner { THROW 'permission_denied: ' + $parent_id; };
    CREATE turn CONTENT $record RETURN NONE;
    COMMIT TRANSACTION;
";

const CREATE_ATTACHED: &str = "
    BEGIN TRANSACTION;
    LET $parent = (SELECT owner, primary_child_id FROM turn WHERE turn_id = $parent_id)[0];
    IF !$parent { THROW 'not_found: ' + $parent_id; };
    IF $parent.owner != $owner { THROW 'permission_denied: ' + $parent_id; };
    IF $primary_only AND $parent.primary_child_id { THROW 'conflict: ' + $parent_id; };
    CREATE turn CONTENT $record RETURN NONE;
    IF $parent.primary_child_id {
        UPDATE turn SET branched_child_ids += $child_id WHERE turn_id = $parent_id RETURN NONE;
    } ELSE {
        UPDATE turn SET primary_child_id = $child_id WHERE turn_id = $parent_id RETURN NONE;
    };
    COMMIT TRANSACTION;
";

const ATTACH_PRIMARY: &str = "
    BEGIN TRANSACTION;
    LET $parent = (SELECT primary_child_id, branched_child_ids FROM turn WHERE turn_id = $parent_id)[0];
    IF !$parent { THROW 'not_found: ' + $parent_id; };
    LET $child = (SELECT parent_id FROM turn WHERE turn_id = $child_id)[0];
    IF !$child { THROW 'not_found: ' + $child_id; };
    IF $child.parent_id != $parent_id { THROW 'invalid: not a child ' + $child_id; };
    IF $child_id IN $parent.branched_child_ids { THROW 'invalid: already a branch ' + $child_id; };
    IF $parent.primary_child_id AND $parent.primary_child_id != $child_id {
        THROW 'conflict: ' + $parent_id;
    };
    UPDATE turn SET primary_child_id = $child_id WHERE turn_id = $parent_id RETURN NONE;
    COMMIT TRANSACTION;
";

const ATTACH_BRANCH: &str = "
    BEGIN TRANSACTION;
    LET $parent = (SELECT primary_child_id, branched_child_ids FROM turn WHERE turn_id = $parent_id)[0];
    IF !$parent { THROW 'not_found: ' + $parent_id; };
    LET $child = (SELECT parent_id FROM turn WHERE turn_id = $child_id)[0];
    IF !$child { THROW 'not_found: ' + $child_id; };
    IF $child.parent_id != $parent_id { THROW 'invalid: not a child ' + $child_id; };
    IF $parent.primary_child_id = $child_id { THROW 'invalid: already primary ' + $child_id; };
    IF !($child_id IN $parent.branched_child_ids) {
        UPDATE turn SET branched_child_ids += $child_id WHERE turn_id = $parent_id RETURN NONE;
    };
    COMMIT TRANSACTION;
";

/// 事务冲突时的重试次数
const MAX_TX_ATTEMPTS: usize = 3;

/// SurrealDB 连接
#[derive(Clone)]
pub struct SurrealPool {
    db: Surreal<Any>,
}

impl SurrealPool {
    /// 连接并选择命名空间和数据库
    pub async fn new(config: &StorageConfig) -> std::result::Result<Self, surrealdb::Error> {
        let db: Surreal<Any> = connect(config.url.as_str()).await?;

        // 内嵌内存引擎不需要认证
        if !config.url.starts_with("mem://") {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await?;
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;
        db.query(SCHEMA).await?.check()?;

        Ok(Self { db })
    }

    pub fn inner(&self) -> Surreal<Any> {
        self.db.clone()
    }
}

/// 数据库中的轮次记录（`id` 字段留给 SurrealDB 的记录 ID）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TurnRecord {
    turn_id: String,
    parent_id: Option<String>,
    primary_child_id: Option<String>,
    #[serde(default)]
    branched_child_ids: Vec<String>,
    human_text: Option<String>,
    bot_text: Option<String>,
    model: Option<String>,
    owner: String,
    created_at: DateTime<Utc>,
}

impl From<Turn> for TurnRecord {
    fn from(turn: Turn) -> Self {
        Self {
            turn_id: turn.id,
            parent_id: turn.parent_id,
            primary_child_id: turn.primary_child_id,
            branched_child_ids: turn.branched_child_ids,
            human_text: turn.human_text,
            bot_text: turn.bot_text,
            model: turn.model,
            owner: turn.owner,
            created_at: turn.created_at,
        }
    }
}

impl From<TurnRecord> for Turn {
    fn from(record: TurnRecord) -> Self {
        Self {
            id: record.turn_id,
            parent_id: record.parent_id,
            primary_child_id: record.primary_child_id,
            branched_child_ids: record.branched_child_ids,
            human_text: record.human_text,
            bot_text: record.bot_text,
            model: record.model,
            owner: record.owner,
            created_at: record.created_at,
        }
    }
}

/// 把事务中 THROW 的前缀映射为领域错误
fn map_tx_error(e: surrealdb::Error) -> AppError {
    let message = e.to_string();
    if message.contains("not_found: ") {
        AppError::NotFound(message)
    } else if message.contains("permission_denied: ") {
        AppError::PermissionDenied(message)
    } else if message.contains("conflict: ") {
        AppError::Conflict(message)
    } else if message.contains("invalid: ") {
        AppError::Validation(message)
    } else {
        AppError::Database(message)
    }
}

fn is_retryable(e: &surrealdb::Error) -> bool {
    let message = e.to_string().to_lowercase();
    message.contains("transaction conflict") || message.contains("resource busy")
}

/// 轮次仓储实现
#[derive(Clone)]
pub struct SurrealTurnStore {
    db: Surreal<Any>,
}

impl SurrealTurnStore {
    pub fn new(pool: &SurrealPool) -> Self {
        Self { db: pool.inner() }
    }

    /// 执行链接事务，遇到存储层的乐观并发冲突时重试
    async fn run_link_tx(
        &self,
        sql: &'static str,
        parent_id: &str,
        child_id: &str,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .db
                .query(sql)
                .bind(("parent_id", parent_id.to_string()))
                .bind(("child_id", child_id.to_string()))
                .await
                .and_then(|response| response.check());

            match result {
                Ok(_) => return Ok(()),
                Err(e) if is_retryable(&e) && attempt < MAX_TX_ATTEMPTS => {
                    warn!(parent_id = %parent_id, attempt, "retrying link transaction");
                }
                Err(e) => return Err(map_tx_error(e)),
            }
        }
    }

    async fn select_where(&self, condition: &str, owner: &str) -> Result<Vec<Turn>> {
        let query = format!("SELECT {} FROM turn WHERE {}", FIELDS, condition);
        let records: Vec<TurnRecord> = self
            .db
            .query(query)
            .bind(("owner", owner.to_string()))
            .await?
            .take(0)?;
        Ok(records.into_iter().map(Turn::from).collect())
    }
}

#[async_trait]
impl TurnStore for SurrealTurnStore {
    async fn create(
        &self,
        parent_id: Option<&str>,
        owner: &str,
        human_text: Option<&str>,
    ) -> Result<Turn> {
        let turn = Turn::new(parent_id, owner, human_text);
        let record = TurnRecord::from(turn.clone());

        let sql = if parent_id.is_some() { CREATE_CHILD } else { CREATE_ROOT };
        self.db
            .query(sql)
            .bind(("record", record))
            .bind(("parent_id", parent_id.unwrap_or_default().to_string()))
            .bind(("owner", owner.to_string()))
            .await
            .and_then(|response| response.check())
            .map_err(map_tx_error)?;

        debug!(turn_id = %turn.id, parent_id = ?parent_id, "turn created");
        Ok(turn)
    }

    async fn get(&self, id: &str) -> Result<Turn> {
        let query = format!("SELECT {} FROM turn WHERE turn_id = $id", FIELDS);
        let records: Vec<TurnRecord> = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;

        records
            .into_iter()
            .next()
            .map(Turn::from)
            .ok_or_else(|| AppError::NotFound(format!("Turn not found: {}", id)))
    }

    async fn set_bot_text(&self, id: &str, text: &str, model: Option<&str>) -> Result<Turn> {
        self.get(id).await?;

        self.db
            .query("UPDATE turn SET bot_text = $text, model = $model WHERE turn_id = $id RETURN NONE")
            .bind(("id", id.to_string()))
            .bind(("text", text.to_string()))
            .bind(("model", model.map(String::from)))
            .await?
            .check()?;

        self.get(id).await
    }

    async fn answer_if_pending(&self, id: &str, text: &str, model: Option<&str>) -> Result<Turn> {
        let query = format!(
            "UPDATE turn SET bot_text = $text, model = $model WHERE turn_id = $id AND !bot_text RETURN {}",
            FIELDS
        );
        let updated: Vec<TurnRecord> = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("text", text.to_string()))
            .bind(("model", model.map(String::from)))
            .await?
            .take(0)?;

        if let Some(record) = updated.into_iter().next() {
            return Ok(Turn::from(record));
        }

        // 没有更新任何记录：轮次不存在或已有回复
        self.get(id).await?;
        Err(AppError::Conflict(format!(
            "Turn {} already has a bot reply",
            id
        )))
    }

    async fn attach_primary_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        self.run_link_tx(ATTACH_PRIMARY, parent_id, child_id).await
    }

    async fn attach_branch_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        self.run_link_tx(ATTACH_BRANCH, parent_id, child_id).await
    }

    async fn list_roots_for_owner(&self, owner: &str) -> Result<Vec<Turn>> {
        self.select_where("owner = $owner AND !parent_id", owner).await
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Turn>> {
        self.select_where("owner = $owner", owner).await
    }

    async fn create_attached(
        &self,
        parent_id: &str,
        owner: &str,
        human_text: Option<&str>,
        mode: AttachMode,
    ) -> Result<Turn> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let turn = Turn::new(Some(parent_id), owner, human_text);
            let result = self
                .db
                .query(CREATE_ATTACHED)
                .bind(("record", TurnRecord::from(turn.clone())))
                .bind(("parent_id", parent_id.to_string()))
                .bind(("child_id", turn.id.clone()))
                .bind(("owner", owner.to_string()))
                .bind(("primary_only", mode == AttachMode::Primary))
                .await
                .and_then(|response| response.check());

            match result {
                Ok(_) => {
                    debug!(turn_id = %turn.id, parent_id = %parent_id, ?mode, "turn created and attached");
                    return Ok(turn);
                }
                Err(e) if is_retryable(&e) && attempt < MAX_TX_ATTEMPTS => {
                    warn!(parent_id = %parent_id, attempt, "retrying create transaction");
                }
                Err(e) if is_retryable(&e) && mode == AttachMode::Primary => {
                    return Err(AppError::Conflict(format!(
                        "Concurrent reply won primary slot of {}",
                        parent_id
                    )));
                }
                Err(e) => return Err(map_tx_error(e)),
            }
        }
    }
}
