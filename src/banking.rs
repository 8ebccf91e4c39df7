//! Built-in route catalogues.
//!
//! [`banking_routes`] is the intent set of the bank assistant. Each route carries a
//! `tool` metadata entry naming the [`crate::tools`] function that serves it (empty for
//! conversational routes) and a `category`.
//!
//! [`topic_routes`] is a small general-knowledge catalogue used by the `demo` command.

use crate::route::{Route, RouterDefinition, RoutingConfig};

/// Queries run after a rebuild to check the router answers sensibly.
pub const REBUILD_SMOKE_QUERIES: &[&str] = &[
    "i want loan",
    "loans",
    "personal loan",
    "help me with my policy details",
    "how to close my account",
    "I need a credit card",
    "What is the FD interest rate?",
    "Need USD for travel",
];

/// Queries for the topic demo.
pub const TOPIC_DEMO_QUERIES: &[&str] = &[
    "What's new in artificial intelligence?",
    "Who won the championship?",
    "How do I make spaghetti carbonara?",
    "Where should I travel for summer vacation?",
    "Hello, what can you do?",
    "Tell me about deep learning algorithms",
    "What are the best hiking trails?",
    "How to prepare a vegan meal?",
];

/// References added to the `technology` route during the demo.
pub const TOPIC_DEMO_EXTRA_REFERENCES: &[&str] = &[
    "What is artificial general intelligence?",
    "Explain reinforcement learning",
];

fn banking_route(name: &str, tool: &str, threshold: f32, references: &[&str]) -> Route {
    Route::new(name, references.iter().copied())
        .with_metadata("category", "banking")
        .with_metadata("tool", tool)
        .with_distance_threshold(threshold)
}

pub fn banking_routes() -> Vec<Route> {
    vec![
        banking_route(
            "loans",
            "calculate_emi",
            0.5,
            &[
                "i want loan",
                "I want a personal loan",
                "personal loan",
                "home loan interest rate",
                "calculate my EMI",
                "what will be my monthly installment",
                "how much EMI for 5 lakh loan",
                "car loan eligibility",
                "can I get a loan for my wedding",
                "loan for education",
            ],
        ),
        banking_route(
            "cards",
            "recommend_card",
            0.5,
            &[
                "I need a credit card",
                "which credit card is best for me",
                "recommend a card for travel",
                "credit card with cashback",
                "card with airport lounge access",
                "lifetime free credit card",
                "best card for online shopping",
            ],
        ),
        banking_route(
            "savings",
            "suggest_fd_ladder",
            0.5,
            &[
                "What is the FD interest rate?",
                "fixed deposit rates",
                "suggest an FD ladder",
                "where should I invest my savings",
                "senior citizen fixed deposit",
                "how to split my deposits",
                "best savings options",
            ],
        ),
        banking_route(
            "policy",
            "search_policy",
            0.55,
            &[
                "help me with my policy details",
                "what is the bank policy on",
                "what are the charges for",
                "minimum balance rules",
                "what is the penalty for late payment",
                "KYC requirements",
                "terms and conditions of my account",
            ],
        ),
        banking_route(
            "forex",
            "get_forex_rates",
            0.5,
            &[
                "Need USD for travel",
                "exchange rate for dollars",
                "convert rupees to euros",
                "forex card",
                "what is today's pound rate",
                "buy foreign currency",
                "send money abroad",
            ],
        ),
        banking_route(
            "fraud",
            "handle_fraud_dispute",
            0.5,
            &[
                "I see a transaction I did not make",
                "unauthorized transaction on my card",
                "my card was stolen",
                "I lost my debit card",
                "dispute a charge",
                "someone used my card without permission",
                "report fraud",
                "I was charged twice",
            ],
        ),
        banking_route(
            "account_services",
            "",
            0.5,
            &[
                "how to close my account",
                "open a savings account",
                "update my address",
                "change my mobile number",
                "download my account statement",
                "request a cheque book",
                "reset my netbanking password",
            ],
        ),
        banking_route(
            "greeting",
            "",
            0.4,
            &[
                "hello",
                "hi there",
                "good morning",
                "thank you",
                "what can you help me with",
                "bye",
            ],
        )
        .with_metadata("category", "general"),
    ]
}

fn topic_route(name: &str, category: &str, threshold: f32, references: &[&str]) -> Route {
    Route::new(name, references.iter().copied())
        .with_metadata("category", category)
        .with_metadata("handler", format!("{category}_handler"))
        .with_distance_threshold(threshold)
}

pub fn topic_routes() -> Vec<Route> {
    vec![
        topic_route(
            "technology",
            "tech",
            0.4,
            &[
                "What's the latest in AI?",
                "Tell me about machine learning",
                "How does cloud computing work?",
                "Explain quantum computers",
                "What are the newest programming languages?",
                "How do neural networks function?",
                "What is blockchain technology?",
            ],
        ),
        topic_route(
            "sports",
            "sports",
            0.4,
            &[
                "Who won the game last night?",
                "What's the latest football score?",
                "Tell me about the Olympics",
                "How is my favorite team doing?",
                "What are the basketball rankings?",
                "Who holds the world record?",
                "When is the next match?",
            ],
        ),
        topic_route(
            "cooking",
            "cooking",
            0.4,
            &[
                "How do I make pasta?",
                "What's a good recipe for chicken?",
                "How to bake a cake?",
                "What ingredients do I need for pizza?",
                "How long should I cook steak?",
                "What's a healthy breakfast option?",
                "How to make vegetarian dishes?",
            ],
        ),
        topic_route(
            "travel",
            "travel",
            0.4,
            &[
                "What are good places to visit in Europe?",
                "How do I plan a vacation?",
                "What's the best time to visit Japan?",
                "Where should I stay in Paris?",
                "What documents do I need for travel?",
                "How to book cheap flights?",
                "What are popular tourist attractions?",
            ],
        ),
        topic_route(
            "general",
            "general",
            0.5,
            &[
                "Hello",
                "How are you?",
                "What can you help me with?",
                "Tell me something interesting",
                "What's the weather like?",
                "I need help",
                "Thank you",
            ],
        ),
    ]
}

pub fn banking_router_definition(name: &str, routing: RoutingConfig) -> RouterDefinition {
    RouterDefinition::new(name, banking_routes(), routing)
}

pub fn topic_router_definition(name: &str, routing: RoutingConfig) -> RouterDefinition {
    RouterDefinition::new(name, topic_routes(), routing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[test]
    fn test_catalogues_are_valid() {
        banking_router_definition("banking_router", RoutingConfig::default())
            .validate()
            .unwrap();
        topic_router_definition("topic_router", RoutingConfig::default())
            .validate()
            .unwrap();
    }

    #[test]
    fn test_tool_bindings_exist() {
        let names = ToolRegistry::builtin_tool_names();
        for route in banking_routes() {
            let tool = &route.metadata["tool"];
            assert!(tool.is_empty() || names.contains(&tool.as_str()), "{tool}");
        }
    }

    #[test]
    fn test_topic_thresholds() {
        let routes = topic_routes();
        assert_eq!(routes.len(), 5);
        assert_eq!(routes[4].distance_threshold, 0.5);
        assert!(routes[..4].iter().all(|r| r.distance_threshold == 0.4));
        assert_eq!(routes[0].metadata["handler"], "tech_handler");
    }

    #[test]
    fn test_smoke_queries_are_references() {
        let refs: Vec<String> = banking_routes().into_iter().flat_map(|r| r.references).collect();
        for query in REBUILD_SMOKE_QUERIES.iter().filter(|q| **q != "loans") {
            assert!(refs.iter().any(|r| r == query), "{query}");
        }
    }
}
