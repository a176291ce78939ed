//! # Transaction Indexer Client
//!
//! Interface to the external indexing service that serves per-account activity, one
//! query per event category. The production implementation talks GraphQL over HTTP
//! to the subgraph endpoints named in configuration. Every query is a single attempt.

use crate::{errors::IndexerError, types::RawEvent};
use async_trait::async_trait;
use ethers::types::Address;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fmt, time::Duration};
use tracing::{debug, instrument};

//================================================================================================//
//                                         CONSTANTS                                             //
//================================================================================================//

/// Page size for category queries that have no explicit cap.
const DEFAULT_PAGE_SIZE: u32 = 1000;
const USER_AGENT: &str = "activity-sync/0.1";

//================================================================================================//
//                                      TRAIT DEFINITION                                          //
//================================================================================================//

/// Pagination bounds for the exchanges query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeWindow {
    /// Only exchanges strictly after this unix timestamp.
    pub min_timestamp: u64,
    pub max_results: u32,
}

impl Default for ExchangeWindow {
    fn default() -> Self {
        Self {
            min_timestamp: 0,
            max_results: 100,
        }
    }
}

/// The seven category queries of the indexing service.
///
/// Results are raw records with no schema guarantee beyond an optional `type` field
/// and a `timestamp` field.
#[async_trait]
pub trait IndexerClient: Send + Sync + fmt::Debug {
    async fn issued(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError>;

    async fn burned(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError>;

    async fn fees_claimed(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError>;

    async fn exchanges_since(
        &self,
        from_address: Address,
        window: ExchangeWindow,
    ) -> Result<Vec<RawEvent>, IndexerError>;

    /// Depot user actions. These records already carry their own `type`.
    async fn depot_user_actions(&self, user: Address) -> Result<Vec<RawEvent>, IndexerError>;

    async fn depot_cleared_deposits(&self, to_address: Address) -> Result<Vec<RawEvent>, IndexerError>;

    async fn depot_exchanges(&self, from: Address) -> Result<Vec<RawEvent>, IndexerError>;
}

//================================================================================================//
//                                   GRAPHQL IMPLEMENTATION                                       //
//================================================================================================//

/// Subgraph endpoints, one per indexed protocol area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerEndpoints {
    /// Issuance, burns and fee claims.
    pub snx: String,
    pub exchanges: String,
    pub depot: String,
}

const ISSUED_QUERY: &str = r#"
query Issued($account: String!, $first: Int!) {
  issueds(first: $first, where: { account: $account }, orderBy: timestamp, orderDirection: desc) {
    id account value block timestamp
  }
}"#;

const BURNED_QUERY: &str = r#"
query Burned($account: String!, $first: Int!) {
  burneds(first: $first, where: { account: $account }, orderBy: timestamp, orderDirection: desc) {
    id account value block timestamp
  }
}"#;

const FEES_CLAIMED_QUERY: &str = r#"
query FeesClaimed($account: String!, $first: Int!) {
  feesClaimeds(first: $first, where: { account: $account }, orderBy: timestamp, orderDirection: desc) {
    id account value rewards block timestamp
  }
}"#;

const EXCHANGES_QUERY: &str = r#"
query Exchanges($from: String!, $minTimestamp: BigInt!, $first: Int!) {
  synthExchanges(first: $first, where: { from: $from, timestamp_gt: $minTimestamp }, orderBy: timestamp, orderDirection: desc) {
    id from fromCurrencyKey fromAmount fromAmountInUSD toCurrencyKey toAmount toAmountInUSD toAddress gasPrice block timestamp
  }
}"#;

const DEPOT_USER_ACTIONS_QUERY: &str = r#"
query DepotUserActions($user: String!, $first: Int!) {
  userActions(first: $first, where: { user: $user }, orderBy: timestamp, orderDirection: desc) {
    id type user amount minimum depositIndex block timestamp
  }
}"#;

const DEPOT_CLEARED_DEPOSITS_QUERY: &str = r#"
query ClearedDeposits($toAddress: String!, $first: Int!) {
  clearedDeposits(first: $first, where: { toAddress: $toAddress }, orderBy: timestamp, orderDirection: desc) {
    id fromAddress toAddress fromETHAmount toAmount depositIndex block timestamp
  }
}"#;

const DEPOT_EXCHANGES_QUERY: &str = r#"
query DepotExchanges($from: String!, $first: Int!) {
  exchanges(first: $first, where: { from: $from }, orderBy: timestamp, orderDirection: desc) {
    id from fromCurrency fromAmount toCurrency toAmount block timestamp
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlReply {
    data: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    errors: Vec<GraphQlMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphQlMessage {
    message: String,
}

/// Lower-case, `0x`-prefixed hex, as the subgraphs store addresses.
fn address_key(address: &Address) -> String {
    format!("{:#x}", address)
}

#[derive(Debug, Clone)]
pub struct GraphQlIndexerClient {
    client: Client,
    endpoints: IndexerEndpoints,
}

impl GraphQlIndexerClient {
    pub fn new(endpoints: IndexerEndpoints, timeout: Duration) -> Result<Self, IndexerError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IndexerError::ClientSetup(e.to_string()))?;
        Ok(Self { client, endpoints })
    }

    /// Runs one GraphQL query and returns the records under `collection`.
    #[instrument(skip(self, query, variables), level = "debug")]
    async fn fetch_collection(
        &self,
        endpoint: &str,
        name: &'static str,
        collection: &'static str,
        query: &'static str,
        variables: Value,
    ) -> Result<Vec<RawEvent>, IndexerError> {
        let body = json!({ "query": query, "variables": variables });
        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexerError::Transport {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Status {
                query: name,
                status: status.as_u16(),
            });
        }

        let reply: GraphQlReply = response.json().await.map_err(|e| IndexerError::ResponseParse {
            query: name,
            message: e.to_string(),
        })?;
        let records = extract_collection(reply, name, collection)?;
        debug!(target: "indexer", query = name, records = records.len(), "Indexer query completed");
        Ok(records)
    }
}

fn extract_collection(
    reply: GraphQlReply,
    name: &'static str,
    collection: &'static str,
) -> Result<Vec<RawEvent>, IndexerError> {
    if !reply.errors.is_empty() {
        let message = reply
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(IndexerError::GraphQl { query: name, message });
    }

    let mut data = reply.data.ok_or_else(|| IndexerError::ResponseParse {
        query: name,
        message: "response has no data".to_string(),
    })?;

    match data.remove(collection) {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(IndexerError::ResponseParse {
                    query: name,
                    message: format!("expected an object in {}, got {}", collection, other),
                }),
            })
            .collect(),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(IndexerError::ResponseParse {
            query: name,
            message: format!("expected an array for {}, got {}", collection, other),
        }),
    }
}

#[async_trait]
impl IndexerClient for GraphQlIndexerClient {
    async fn issued(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError> {
        let variables = json!({ "account": address_key(&account), "first": DEFAULT_PAGE_SIZE });
        self.fetch_collection(&self.endpoints.snx, "issued", "issueds", ISSUED_QUERY, variables)
            .await
    }

    async fn burned(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError> {
        let variables = json!({ "account": address_key(&account), "first": DEFAULT_PAGE_SIZE });
        self.fetch_collection(&self.endpoints.snx, "burned", "burneds", BURNED_QUERY, variables)
            .await
    }

    async fn fees_claimed(&self, account: Address) -> Result<Vec<RawEvent>, IndexerError> {
        let variables = json!({ "account": address_key(&account), "first": DEFAULT_PAGE_SIZE });
        self.fetch_collection(
            &self.endpoints.snx,
            "feesClaimed",
            "feesClaimeds",
            FEES_CLAIMED_QUERY,
            variables,
        )
        .await
    }

    async fn exchanges_since(
        &self,
        from_address: Address,
        window: ExchangeWindow,
    ) -> Result<Vec<RawEvent>, IndexerError> {
        let variables = json!({
            "from": address_key(&from_address),
            "minTimestamp": window.min_timestamp.to_string(),
            "first": window.max_results,
        });
        self.fetch_collection(
            &self.endpoints.exchanges,
            "exchanges",
            "synthExchanges",
            EXCHANGES_QUERY,
            variables,
        )
        .await
    }

    async fn depot_user_actions(&self, user: Address) -> Result<Vec<RawEvent>, IndexerError> {
        let variables = json!({ "user": address_key(&user), "first": DEFAULT_PAGE_SIZE });
        self.fetch_collection(
            &self.endpoints.depot,
            "depotUserActions",
            "userActions",
            DEPOT_USER_ACTIONS_QUERY,
            variables,
        )
        .await
    }

    async fn depot_cleared_deposits(&self, to_address: Address) -> Result<Vec<RawEvent>, IndexerError> {
        let variables = json!({ "toAddress": address_key(&to_address), "first": DEFAULT_PAGE_SIZE });
        self.fetch_collection(
            &self.endpoints.depot,
            "depotClearedDeposits",
            "clearedDeposits",
            DEPOT_CLEARED_DEPOSITS_QUERY,
            variables,
        )
        .await
    }

    async fn depot_exchanges(&self, from: Address) -> Result<Vec<RawEvent>, IndexerError> {
        let variables = json!({ "from": address_key(&from), "first": DEFAULT_PAGE_SIZE });
        self.fetch_collection(
            &self.endpoints.depot,
            "depotExchanges",
            "exchanges",
            DEPOT_EXCHANGES_QUERY,
            variables,
        )
        .await
    }
}
