//! 对话服务
//!
//! 创建对话、回复、分支回复、按定位轮次获取对话路径、列出对话。
//! 所有校验都在写入之前完成；回复生成在轮次提交之后进行，失败只会让 `bot_text` 保持为空。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::config::AppConfig;
use crate::error::{AppError, GenerationError, Result};
use crate::index::TreeIndex;
use crate::models::conversation::{ConversationListItem, GenerationStatus, TurnOutcome};
use crate::models::turn::{AttachMode, Turn};
use crate::observability::ConversationMetrics;
use crate::services::responder::BotResponder;
use crate::storage::repository::TurnStore;

/// 服务选项
#[derive(Debug, Clone)]
pub struct ConversationOptions {
    /// 标题最大字符数
    pub title_max_chars: usize,
    /// 用户输入最大字符数
    pub max_text_chars: usize,
    /// 单次回复生成超时
    pub generation_timeout: Duration,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            title_max_chars: 80,
            max_text_chars: 32_000,
            generation_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for ConversationOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            title_max_chars: config.conversation.title_max_chars,
            max_text_chars: config.conversation.max_text_chars,
            generation_timeout: Duration::from_secs(config.responder.timeout_secs),
        }
    }
}

/// 对话服务 trait
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// 创建对话（根轮次）
    async fn create_conversation(&self, owner: &str, text: &str, wait: bool)
    -> Result<TurnOutcome>;

    /// 沿主线回复；父轮次已有主子轮次时返回 `Conflict`
    async fn reply(
        &self,
        parent_turn_id: &str,
        owner: &str,
        text: &str,
        wait: bool,
    ) -> Result<TurnOutcome>;

    /// 分支回复；主槽位空闲时成为主子轮次，否则追加为分支
    async fn branch_reply(
        &self,
        parent_turn_id: &str,
        owner: &str,
        text: &str,
        wait: bool,
    ) -> Result<TurnOutcome>;

    /// 从根到定位轮次的路径
    async fn get_conversation(&self, identifying_turn_id: &str, owner: &str) -> Result<Vec<Turn>>;

    /// 列出所有者的对话（每个根一项，无序）
    async fn list_conversations(&self, owner: &str) -> Result<Vec<ConversationListItem>>;

    /// 列出根与所有分支起点各自对应的对话（无序）
    async fn list_branch_conversations(&self, owner: &str) -> Result<Vec<ConversationListItem>>;

    /// 获取单个轮次
    async fn get_turn(&self, turn_id: &str, owner: &str) -> Result<Turn>;

    /// 获取直接子轮次
    async fn children(&self, turn_id: &str, owner: &str) -> Result<Vec<Turn>>;

    /// 为尚无回复的轮次重新生成回复
    async fn regenerate(&self, turn_id: &str, owner: &str, wait: bool) -> Result<TurnOutcome>;
}

/// 回复生成器，可整体克隆到后台任务
#[derive(Clone)]
struct Generator {
    store: Arc<dyn TurnStore>,
    index: TreeIndex,
    responder: Arc<dyn BotResponder>,
    timeout: Duration,
    metrics: Arc<ConversationMetrics>,
}

impl Generator {
    async fn answer(&self, turn: Turn) -> TurnOutcome {
        match self.try_answer(&turn).await {
            Ok(answered) => {
                self.metrics.record_answer();
                TurnOutcome {
                    turn: answered,
                    generation: GenerationStatus::Answered,
                }
            }
            Err(e) => {
                self.metrics.record_generation_failure();
                warn!(turn_id = %turn.id, error = %e, "bot reply generation failed");
                TurnOutcome {
                    turn,
                    generation: GenerationStatus::Failed(e.to_string()),
                }
            }
        }
    }

    async fn try_answer(&self, turn: &Turn) -> Result<Turn> {
        let context = self.index.path_to_root(&turn.id).await?;

        let text = tokio::time::timeout(self.timeout, self.responder.generate(&context))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))??;

        let model = self.responder.model_name();
        match self
            .store
            .answer_if_pending(&turn.id, &text, Some(model.as_str()))
            .await
        {
            Ok(answered) => {
                debug!(turn_id = %turn.id, model = %model, "bot reply attached");
                Ok(answered)
            }
            // 另一次生成已先写入回复，保留已写入的那一个
            Err(AppError::Conflict(_)) => {
                debug!(turn_id = %turn.id, "bot reply already present, discarding later answer");
                self.store.get(&turn.id).await
            }
            Err(e) => Err(e),
        }
    }

    /// 等待或在后台生成回复
    async fn run(&self, turn: Turn, wait: bool) -> TurnOutcome {
        if wait {
            return self.answer(turn).await;
        }

        let generator = self.clone();
        let pending = turn.clone();
        tokio::spawn(async move {
            generator.answer(turn).await;
        });

        TurnOutcome {
            turn: pending,
            generation: GenerationStatus::Pending,
        }
    }
}

/// 对话服务实现
pub struct ConversationServiceImpl {
    store: Arc<dyn TurnStore>,
    index: TreeIndex,
    generator: Generator,
    options: ConversationOptions,
    metrics: Arc<ConversationMetrics>,
}

impl ConversationServiceImpl {
    /// 创建新的服务实例
    pub fn new(
        store: Arc<dyn TurnStore>,
        responder: Arc<dyn BotResponder>,
        options: ConversationOptions,
        metrics: Arc<ConversationMetrics>,
    ) -> Self {
        let index = TreeIndex::new(store.clone());
        let generator = Generator {
            store: store.clone(),
            index: index.clone(),
            responder,
            timeout: options.generation_timeout,
            metrics: metrics.clone(),
        };

        Self {
            store,
            index,
            generator,
            options,
            metrics,
        }
    }

    fn validate_owner(owner: &str) -> Result<()> {
        if owner.trim().is_empty() {
            return Err(AppError::Validation("Owner cannot be empty".to_string()));
        }
        Ok(())
    }

    fn validate_id(id: &str) -> Result<()> {
        Uuid::parse_str(id)
            .map(|_| ())
            .map_err(|_| AppError::Validation(format!("Malformed turn id: {}", id)))
    }

    fn validate_text(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("Text cannot be empty".to_string()));
        }

        let len = text.chars().count();
        if len > self.options.max_text_chars {
            return Err(AppError::Validation(format!(
                "Text too long: {} characters (max {})",
                len, self.options.max_text_chars
            )));
        }
        Ok(())
    }

    /// 解析轮次并校验其所在树的所有者
    async fn authorize(&self, turn_id: &str, owner: &str) -> Result<Turn> {
        Self::validate_owner(owner)?;
        Self::validate_id(turn_id)?;

        let turn = self.store.get(turn_id).await?;
        let root = self.index.find_root(&turn.id).await?;
        if root.owner != owner {
            return Err(AppError::PermissionDenied(format!(
                "Conversation {} is not owned by {}",
                root.id, owner
            )));
        }
        Ok(turn)
    }

    async fn add_child(
        &self,
        parent_turn_id: &str,
        owner: &str,
        text: &str,
        mode: AttachMode,
        wait: bool,
    ) -> Result<TurnOutcome> {
        self.validate_text(text)?;
        self.authorize(parent_turn_id, owner).await?;

        let turn = match self
            .store
            .create_attached(parent_turn_id, owner, Some(text), mode)
            .await
        {
            Ok(turn) => turn,
            Err(AppError::Conflict(msg)) => {
                self.metrics.record_conflict();
                info!(parent_id = %parent_turn_id, owner = %owner, "primary slot already taken");
                return Err(AppError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };

        self.metrics.record_turn();
        info!(turn_id = %turn.id, parent_id = %parent_turn_id, owner = %owner, ?mode, "turn added");
        Ok(self.generator.run(turn, wait).await)
    }

    fn list_item(&self, head: &Turn, root_id: &str, leaf: &Turn) -> ConversationListItem {
        ConversationListItem::new(head, root_id, &leaf.id, self.options.title_max_chars)
    }
}

#[async_trait]
impl ConversationService for ConversationServiceImpl {
    async fn create_conversation(
        &self,
        owner: &str,
        text: &str,
        wait: bool,
    ) -> Result<TurnOutcome> {
        Self::validate_owner(owner)?;
        self.validate_text(text)?;

        let root = self.store.create(None, owner, Some(text)).await?;
        self.metrics.record_turn();
        info!(turn_id = %root.id, owner = %owner, "conversation created");

        Ok(self.generator.run(root, wait).await)
    }

    async fn reply(
        &self,
        parent_turn_id: &str,
        owner: &str,
        text: &str,
        wait: bool,
    ) -> Result<TurnOutcome> {
        self.add_child(parent_turn_id, owner, text, AttachMode::Primary, wait)
            .await
    }

    async fn branch_reply(
        &self,
        parent_turn_id: &str,
        owner: &str,
        text: &str,
        wait: bool,
    ) -> Result<TurnOutcome> {
        self.add_child(parent_turn_id, owner, text, AttachMode::PrimaryOrBranch, wait)
            .await
    }

    async fn get_conversation(&self, identifying_turn_id: &str, owner: &str) -> Result<Vec<Turn>> {
        Self::validate_owner(owner)?;
        Self::validate_id(identifying_turn_id)?;

        let path = self.index.path_to_root(identifying_turn_id).await?;
        match path.first() {
            Some(root) if root.owner == owner => Ok(path),
            Some(root) => Err(AppError::PermissionDenied(format!(
                "Conversation {} is not owned by {}",
                root.id, owner
            ))),
            None => Err(AppError::NotFound(format!(
                "Turn not found: {}",
                identifying_turn_id
            ))),
        }
    }

    async fn list_conversations(&self, owner: &str) -> Result<Vec<ConversationListItem>> {
        Self::validate_owner(owner)?;

        let roots = self.store.list_roots_for_owner(owner).await?;
        let mut items = Vec::with_capacity(roots.len());
        for root in &roots {
            let leaf = self.index.primary_leaf(&root.id).await?;
            items.push(self.list_item(root, &root.id, &leaf));
        }

        debug!(owner = %owner, count = items.len(), "conversations listed");
        Ok(items)
    }

    async fn list_branch_conversations(&self, owner: &str) -> Result<Vec<ConversationListItem>> {
        Self::validate_owner(owner)?;

        let heads = self.index.branch_heads(owner).await?;
        let mut items = Vec::with_capacity(heads.len());
        for head in &heads {
            let root_id = if head.is_root() {
                head.id.clone()
            } else {
                self.index.find_root(&head.id).await?.id
            };
            let leaf = self.index.primary_leaf(&head.id).await?;
            items.push(self.list_item(head, &root_id, &leaf));
        }

        debug!(owner = %owner, count = items.len(), "branch conversations listed");
        Ok(items)
    }

    async fn get_turn(&self, turn_id: &str, owner: &str) -> Result<Turn> {
        self.authorize(turn_id, owner).await
    }

    async fn children(&self, turn_id: &str, owner: &str) -> Result<Vec<Turn>> {
        self.authorize(turn_id, owner).await?;
        self.index.children(turn_id).await
    }

    async fn regenerate(&self, turn_id: &str, owner: &str, wait: bool) -> Result<TurnOutcome> {
        let turn = self.authorize(turn_id, owner).await?;
        if turn.is_answered() {
            return Err(AppError::Conflict(format!(
                "Turn {} already has a bot reply",
                turn_id
            )));
        }

        info!(turn_id = %turn_id, owner = %owner, "regenerating bot reply");
        Ok(self.generator.run(turn, wait).await)
    }
}

/// 创建对话服务
pub fn create_conversation_service(
    store: Arc<dyn TurnStore>,
    responder: Arc<dyn BotResponder>,
    options: ConversationOptions,
    metrics: Arc<ConversationMetrics>,
) -> Box<dyn ConversationService> {
    Box::new(ConversationServiceImpl::new(
        store, responder, options, metrics,
    ))
}
