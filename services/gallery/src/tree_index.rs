use crate::config::IndexConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Kind of node in the materialized tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Folder,
    Image,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Folder => "folder",
            ItemType::Image => "image",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(ItemType::Folder),
            "image" => Some(ItemType::Image),
            _ => None,
        }
    }
}

/// A node in the materialized tree. `(parent, path)` is the unique index key.
/// Items are immutable once written; the index never overwrites an existing
/// `(parent, path)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Fully-qualified key: folders end with the separator, leaves are the raw
    /// object key
    pub path: String,
    /// Key of the containing folder; `/` for top-level items
    pub parent: String,
    /// Node kind
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Hidden from listings when true
    #[serde(default)]
    pub private: bool,
}

impl Item {
    pub fn folder(path: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            parent: parent.into(),
            item_type: ItemType::Folder,
            private: false,
        }
    }

    pub fn image(path: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            parent: parent.into(),
            item_type: ItemType::Image,
            private: false,
        }
    }
}

/// Outcome of a conditional insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No entry occupied the key; the item was written
    Created,
    /// The key was already occupied; the existing entry was left untouched
    AlreadyExists,
}

/// Errors surfaced by the tree index
#[derive(Debug, Error)]
pub enum IndexError {
    /// The underlying store rejected or failed the call
    #[error("index store error: {0}")]
    Store(String),
    /// A stored record is missing required attributes
    #[error("malformed index record: {0}")]
    Corrupt(String),
}

/// Key-value abstraction over the materialized tree.
///
/// All mutation is via single-key conditional writes; there are no multi-key
/// transactions. `children_of` ordering follows whatever the underlying store
/// returns naturally and is not a guarantee callers may rely on.
#[async_trait]
pub trait TreeIndex: Send + Sync {
    /// Insert the item only if no entry with its exact `(parent, path)` pair
    /// exists. An occupied key is reported as `AlreadyExists`, not an error.
    async fn put_if_absent(&self, item: &Item) -> Result<PutOutcome, IndexError>;

    /// Delete the entry at exactly `(parent, path)`. Deleting a missing entry
    /// succeeds.
    async fn delete(&self, parent: &str, path: &str) -> Result<(), IndexError>;

    /// Fetch all items whose parent equals `parent`. A parent with no
    /// children yields an empty vec, which is a successful result.
    async fn children_of(&self, parent: &str) -> Result<Vec<Item>, IndexError>;
}

/// DynamoDB-backed tree index.
///
/// Table schema: partition key `parent` (S), sort key `path` (S), plus
/// `item_type` (S) and `private` (BOOL) attributes.
pub struct DynamoTreeIndex {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoTreeIndex {
    /// Create a new index over the configured table
    pub async fn new(config: &IndexConfig) -> Result<Self> {
        let mut aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(ref endpoint_url) = config.endpoint_url {
            aws_config = aws_config.endpoint_url(endpoint_url);
        }

        let client = DynamoDbClient::new(&aws_config.load().await);

        if config.create_table {
            Self::ensure_table_exists(&client, &config.table_name).await?;
        }

        info!(
            table_name = %config.table_name,
            region = %config.region,
            "Tree index initialized"
        );

        Ok(Self {
            client,
            table_name: config.table_name.clone(),
        })
    }

    /// Create the index table if it does not exist (local development)
    async fn ensure_table_exists(client: &DynamoDbClient, table_name: &str) -> Result<()> {
        match client.describe_table().table_name(table_name).send().await {
            Ok(_) => {
                debug!(table_name = %table_name, "Index table already exists");
                return Ok(());
            }
            Err(e) => {
                let code = e.code().unwrap_or_default();
                if code != "ResourceNotFoundException" {
                    return Err(anyhow::anyhow!(
                        "Failed to check index table existence: {e} (code: {code})"
                    ));
                }
            }
        }

        debug!(table_name = %table_name, "Creating index table");

        let parent_key = KeySchemaElement::builder()
            .attribute_name("parent")
            .key_type(KeyType::Hash)
            .build()
            .context("Failed to build key schema")?;
        let path_key = KeySchemaElement::builder()
            .attribute_name("path")
            .key_type(KeyType::Range)
            .build()
            .context("Failed to build key schema")?;
        let parent_attr = AttributeDefinition::builder()
            .attribute_name("parent")
            .attribute_type(ScalarAttributeType::S)
            .build()
            .context("Failed to build attribute definition")?;
        let path_attr = AttributeDefinition::builder()
            .attribute_name("path")
            .attribute_type(ScalarAttributeType::S)
            .build()
            .context("Failed to build attribute definition")?;

        client
            .create_table()
            .table_name(table_name)
            .billing_mode(BillingMode::PayPerRequest)
            .key_schema(parent_key)
            .key_schema(path_key)
            .attribute_definitions(parent_attr)
            .attribute_definitions(path_attr)
            .send()
            .await
            .context("Failed to create index table")?;

        info!(table_name = %table_name, "Index table created");
        Ok(())
    }
}

#[async_trait]
impl TreeIndex for DynamoTreeIndex {
    #[instrument(skip(self, item), fields(path = %item.path, parent = %item.parent))]
    async fn put_if_absent(&self, item: &Item) -> Result<PutOutcome, IndexError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_to_attrs(item)))
            .condition_expression("attribute_not_exists(#parent)")
            .expression_attribute_names("#parent", "parent")
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Created),
            Err(e) => {
                let conditional_failure = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if conditional_failure {
                    Ok(PutOutcome::AlreadyExists)
                } else {
                    Err(IndexError::Store(format!("put_item failed: {e}")))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, parent: &str, path: &str) -> Result<(), IndexError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("parent", AttributeValue::S(parent.to_string()))
            .key("path", AttributeValue::S(path.to_string()))
            .send()
            .await
            .map_err(|e| IndexError::Store(format!("delete_item failed: {e}")))?;

        debug!(parent = %parent, path = %path, "Index entry deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn children_of(&self, parent: &str) -> Result<Vec<Item>, IndexError> {
        let mut items = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut query = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("#parent = :parent")
                .expression_attribute_names("#parent", "parent")
                .expression_attribute_values(":parent", AttributeValue::S(parent.to_string()));

            if let Some(lek) = last_evaluated_key.take() {
                query = query.set_exclusive_start_key(Some(lek));
            }

            let result = query
                .send()
                .await
                .map_err(|e| IndexError::Store(format!("query failed: {e}")))?;

            for attrs in result.items() {
                items.push(item_from_attrs(attrs)?);
            }

            match result.last_evaluated_key() {
                Some(lek) => last_evaluated_key = Some(lek.clone()),
                None => break,
            }
        }

        debug!(parent = %parent, count = items.len(), "Queried children");
        Ok(items)
    }
}

/// Convert an item to its DynamoDB attribute map
fn item_to_attrs(item: &Item) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "parent".to_string(),
            AttributeValue::S(item.parent.clone()),
        ),
        ("path".to_string(), AttributeValue::S(item.path.clone())),
        (
            "item_type".to_string(),
            AttributeValue::S(item.item_type.as_str().to_string()),
        ),
        ("private".to_string(), AttributeValue::Bool(item.private)),
    ])
}

/// Convert a DynamoDB attribute map back into an item
fn item_from_attrs(attrs: &HashMap<String, AttributeValue>) -> Result<Item, IndexError> {
    let get_s = |name: &str| -> Result<String, IndexError> {
        attrs
            .get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .ok_or_else(|| IndexError::Corrupt(format!("missing attribute '{name}'")))
    };

    let item_type_raw = get_s("item_type")?;
    let item_type = ItemType::parse(&item_type_raw)
        .ok_or_else(|| IndexError::Corrupt(format!("unknown item type '{item_type_raw}'")))?;

    let private = attrs
        .get("private")
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false);

    Ok(Item {
        path: get_s("path")?,
        parent: get_s("parent")?,
        item_type,
        private,
    })
}

/// In-memory tree index used by component tests: same conditional-insert
/// semantics as the DynamoDB adapter over a plain map.
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryTreeIndex {
        entries: Mutex<BTreeMap<(String, String), Item>>,
    }

    impl MemoryTreeIndex {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed an entry directly, bypassing conditional-insert semantics
        pub fn insert_raw(&self, item: Item) {
            self.entries
                .lock()
                .unwrap()
                .insert((item.parent.clone(), item.path.clone()), item);
        }

        pub fn snapshot(&self) -> BTreeMap<(String, String), Item> {
            self.entries.lock().unwrap().clone()
        }

        pub fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        pub fn contains(&self, parent: &str, path: &str) -> bool {
            self.entries
                .lock()
                .unwrap()
                .contains_key(&(parent.to_string(), path.to_string()))
        }
    }

    #[async_trait]
    impl TreeIndex for MemoryTreeIndex {
        async fn put_if_absent(&self, item: &Item) -> Result<PutOutcome, IndexError> {
            let mut entries = self.entries.lock().unwrap();
            let key = (item.parent.clone(), item.path.clone());
            if entries.contains_key(&key) {
                Ok(PutOutcome::AlreadyExists)
            } else {
                entries.insert(key, item.clone());
                Ok(PutOutcome::Created)
            }
        }

        async fn delete(&self, parent: &str, path: &str) -> Result<(), IndexError> {
            self.entries
                .lock()
                .unwrap()
                .remove(&(parent.to_string(), path.to_string()));
            Ok(())
        }

        async fn children_of(&self, parent: &str) -> Result<Vec<Item>, IndexError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .values()
                .filter(|item| item.parent == parent)
                .cloned()
                .collect())
        }
    }
}
