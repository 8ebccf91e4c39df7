//! Semantic search over bank policy sections.
//!
//! Sections are embedded once with the shared [`Embedder`] and indexed in a
//! [`ReferenceStore`] keyed by section id. Hits farther than `max_distance` are dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{Tool, ToolDefinition, ToolError, call_typed};
use crate::embeddings::Embedder;
use crate::reference_store::{IndexKind, ReferenceStore};

pub const TOOL_NAME: &str = "search_policy";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MAX_DISTANCE: f32 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySection {
    pub id: String,
    pub title: String,
    pub text: String,
}

impl PolicySection {
    pub fn new(id: &str, title: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    /// Text that gets embedded.
    pub fn document(&self) -> String {
        format!("{}. {}", self.title, self.text)
    }
}

pub fn default_policies() -> Vec<PolicySection> {
    vec![
        PolicySection::new(
            "minimum-balance",
            "Minimum balance",
            "Savings accounts in metro branches must maintain an average monthly balance of 10,000 rupees. \
             Falling short attracts a charge of up to 600 rupees per month, proportional to the shortfall. \
             Basic savings and salary accounts are exempt.",
        ),
        PolicySection::new(
            "card-late-payment",
            "Credit card late payment charges",
            "If the minimum amount due is not paid by the due date, a late payment fee between 100 and 1,300 rupees \
             applies depending on the outstanding balance. Interest of 3.5% per month is charged on the unpaid balance.",
        ),
        PolicySection::new(
            "kyc",
            "KYC requirements",
            "Customers must submit a valid photo identity proof and address proof such as Aadhaar, passport or voter ID. \
             KYC must be refreshed every two years for high risk accounts and every ten years for low risk accounts.",
        ),
        PolicySection::new(
            "account-closure",
            "Account closure",
            "An account can be closed by submitting the closure form at the home branch. Closure within 14 days of opening \
             is free; closure within one year attracts a fee of 500 rupees. Unused cheque leaves and cards must be returned.",
        ),
        PolicySection::new(
            "fd-premature-withdrawal",
            "Fixed deposit premature withdrawal",
            "Fixed deposits can be withdrawn before maturity. Interest is paid at the rate applicable for the period the \
             deposit remained with the bank, less a penalty of 1%. Tax saver deposits cannot be withdrawn within five years.",
        ),
        PolicySection::new(
            "fraud-liability",
            "Customer liability for unauthorized transactions",
            "Customers reporting an unauthorized electronic transaction within three working days bear zero liability. \
             Reporting within four to seven days limits liability to the transaction value or 25,000 rupees, whichever is lower. \
             Beyond seven days liability is decided as per the board approved policy.",
        ),
        PolicySection::new(
            "forex-remittance",
            "Outward foreign remittance",
            "Resident individuals may remit up to 250,000 US dollars per financial year under the Liberalised Remittance Scheme. \
             A PAN card is mandatory, and tax collected at source applies above 7 lakh rupees.",
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyQuery {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyHit {
    pub section_id: String,
    pub title: String,
    pub text: String,
    pub distance: f32,
}

pub struct PolicySearch {
    sections: Vec<PolicySection>,
    store: ReferenceStore,
    embedder: Box<dyn Embedder>,
    max_distance: f32,
}

impl PolicySearch {
    pub fn new(
        sections: Vec<PolicySection>,
        embedder: Box<dyn Embedder>,
        max_distance: f32,
    ) -> Result<Self, ToolError> {
        let documents: Vec<String> = sections.iter().map(PolicySection::document).collect();
        let vectors = embedder.embed_many(&documents)?;
        let mut store = ReferenceStore::new(embedder.dimension(), IndexKind::Flat);
        store.insert_many(
            sections
                .iter()
                .zip(documents)
                .zip(vectors)
                .map(|((section, doc), vector)| (section.id.clone(), doc, vector)),
        )?;
        info!("Indexed {} policy sections", sections.len());
        Ok(Self {
            sections,
            store,
            embedder,
            max_distance,
        })
    }

    pub fn with_default_policies(embedder: Box<dyn Embedder>) -> Result<Self, ToolError> {
        Self::new(default_policies(), embedder, DEFAULT_MAX_DISTANCE)
    }

    pub fn sections(&self) -> &[PolicySection] {
        &self.sections
    }

    /// Up to `top_k` sections closest to `query`, nearest first.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<PolicyHit>, ToolError> {
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArgument("query must not be empty".into()));
        }
        let vector = self.embedder.embed(query)?;
        let hits = self.store.nearest(&vector, top_k)?;
        Ok(hits
            .into_iter()
            .filter(|hit| hit.distance <= self.max_distance)
            .filter_map(|hit| {
                self.sections
                    .iter()
                    .find(|s| s.id == hit.route_name)
                    .map(|s| PolicyHit {
                        section_id: s.id.clone(),
                        title: s.title.clone(),
                        text: s.text.clone(),
                        distance: hit.distance,
                    })
            })
            .collect())
    }
}

impl Tool for PolicySearch {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: "Search the bank's policy documents for the sections most relevant to a question.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Question about bank policy, fees or rules"},
                    "top_k": {"type": "integer", "minimum": 1, "default": DEFAULT_TOP_K}
                },
                "required": ["query"]
            }),
        }
    }

    fn call(&self, args: Value) -> Result<Value, ToolError> {
        call_typed(args, |req: PolicyQuery| {
            self.search(&req.query, req.top_k.unwrap_or(DEFAULT_TOP_K))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::{FailingEmbedder, KeywordEmbedder};

    fn sections() -> Vec<PolicySection> {
        vec![
            PolicySection::new("a", "Minimum balance", "monthly average balance shortfall"),
            PolicySection::new("b", "Late payment", "credit card overdue fee"),
            PolicySection::new("c", "Account closure", "closure form branch"),
        ]
    }

    fn search(max_distance: f32) -> PolicySearch {
        PolicySearch::new(sections(), Box::new(KeywordEmbedder { dimension: 1024 }), max_distance).unwrap()
    }

    #[test]
    fn test_exact_section_ranks_first() {
        let search = search(2.0);
        let hits = search.search(&sections()[1].document(), 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].section_id, "b");
        assert!(hits[0].distance < 1e-4);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_max_distance_filters() {
        let search = search(0.5);
        let hits = search.search(&sections()[0].document(), 3).unwrap();
        assert_eq!(hits[0].section_id, "a");
        assert!(hits.iter().all(|h| h.distance <= 0.5));
        assert!(search.search("zebra quantum violin", 3).unwrap().is_empty());
    }

    #[test]
    fn test_tool_call_and_errors() {
        let search = search(2.0);
        let out = search
            .call(json!({"query": "credit card overdue fee", "top_k": 1}))
            .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 1);
        assert!(search.search("   ", 3).is_err());

        let failing = PolicySearch::new(sections(), Box::new(FailingEmbedder), 0.5);
        assert!(matches!(failing, Err(ToolError::Router(_))));
    }

    #[test]
    fn test_default_policies_index() {
        let search = PolicySearch::with_default_policies(Box::new(KeywordEmbedder { dimension: 256 })).unwrap();
        assert_eq!(search.sections().len(), default_policies().len());
        let hits = search
            .search(&default_policies()[2].document(), 1)
            .unwrap();
        assert_eq!(hits[0].section_id, "kyc");
    }
}
