//! Built-in topic catalog and index selection.

use serde::Serialize;

use crate::models::{Frequency, Topic};

fn topic(
    id: &str,
    label: &str,
    frequency: Frequency,
    category: &str,
    icon: &str,
    query: &str,
) -> Topic {
    Topic {
        id: id.to_string(),
        label: label.to_string(),
        frequency,
        category: category.to_string(),
        icon: icon.to_string(),
        query: query.to_string(),
    }
}

/// Catalog used when the config does not define `[[intel.topics]]`.
pub fn builtin_topics() -> Vec<Topic> {
    vec![
        topic(
            "phishing_trends",
            "New phishing and scam techniques",
            Frequency::Daily,
            "threats",
            "🎣",
            "What are the newest phishing, scam, and social engineering attack techniques discovered in the last 7 days? Include specific examples, attack vectors, and which platforms are targeted. Focus on techniques targeting European users.",
        ),
        topic(
            "ai_security_startups",
            "AI security startup funding and news",
            Frequency::Weekly,
            "competition",
            "🏢",
            "What AI cybersecurity startups have received funding or launched new products in the last week? Include company names, funding amounts, and what their product does. Focus on browser security, email security, and scam detection.",
        ),
        topic(
            "chrome_extension_trends",
            "Chrome extension monetisation and security trends",
            Frequency::Weekly,
            "product",
            "🌐",
            "What are the latest trends in Chrome extension monetization, security policies, and Manifest v3 changes? Include any new Chrome Web Store policies, popular security extensions, and payment integration options.",
        ),
        topic(
            "nis2_compliance",
            "NIS2 and DORA compliance updates",
            Frequency::Monthly,
            "regulation",
            "⚖️",
            "What are the latest NIS2 and DORA compliance updates for European companies? Include deadlines, enforcement actions, penalties, and which sectors are most affected. Focus on Belgium and Netherlands.",
        ),
        topic(
            "crypto_scams",
            "Crypto scam and fraud alerts",
            Frequency::Daily,
            "threats",
            "🪙",
            "What are the latest cryptocurrency scam alerts, rug pulls, fake exchanges, and pig butchering schemes reported in the last 7 days? Include specific project names, amounts stolen, and warning signs.",
        ),
        topic(
            "mica_genius_act",
            "MiCA and GENIUS Act regulatory updates",
            Frequency::Weekly,
            "regulation",
            "📜",
            "What are the latest updates on the EU MiCA regulation and US GENIUS Act for stablecoins? Include implementation timelines, compliance requirements for exchanges, and impact on crypto markets in Europe.",
        ),
        topic(
            "lfm2_liquid_ai",
            "Liquid AI / LFM2 model updates",
            Frequency::Monthly,
            "technology",
            "🧠",
            "What are the latest updates from Liquid AI, including new model releases, LFM2 updates, fine-tuning capabilities, MLX support changes, and any benchmark improvements? Include technical details.",
        ),
        topic(
            "competitor_extensions",
            "Competitor Chrome security extensions",
            Frequency::Weekly,
            "competition",
            "🔍",
            "What Chrome browser security extensions are currently popular or newly launched? Compare their features, pricing, user counts, and ratings. Focus on anti-phishing, anti-scam, email security, and privacy extensions.",
        ),
    ]
}

/// Listing shape for `GET /topics`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopicInfo {
    pub index: usize,
    pub id: String,
    pub topic: String,
    pub icon: String,
    pub category: String,
    pub frequency: Frequency,
}

pub fn describe(topics: &[Topic]) -> Vec<TopicInfo> {
    topics
        .iter()
        .enumerate()
        .map(|(index, t)| TopicInfo {
            index,
            id: t.id.clone(),
            topic: t.label.clone(),
            icon: t.icon.clone(),
            category: t.category.clone(),
            frequency: t.frequency,
        })
        .collect()
}

/// Resolves a requested index list against the catalog.
///
/// `None` selects every topic. Otherwise the catalog is filtered to the
/// requested indices, keeping catalog order; unknown indices are ignored.
pub fn select(topic_count: usize, indices: Option<&[i64]>) -> Vec<usize> {
    match indices {
        None => (0..topic_count).collect(),
        Some(requested) => (0..topic_count)
            .filter(|&i| requested.contains(&(i as i64)))
            .collect(),
    }
}
