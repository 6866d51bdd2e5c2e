use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Price of one service plan: tokens debited on the wallet path, minor-unit
/// price charged on the provider path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrice {
    pub tokens: i64,
    pub price: i64,
}

/// One priced platform service and its plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Display name shown on checkout pages and statements.
    pub name: String,
    pub plans: IndexMap<String, PlanPrice>,
}

/// Immutable (service_id, plan) -> price table, loaded once at process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    services: IndexMap<String, ServiceEntry>,
}

impl ServiceCatalog {
    pub fn new(services: IndexMap<String, ServiceEntry>) -> Self {
        ServiceCatalog { services }
    }

    pub fn lookup(&self, service_id: &str, plan: &str) -> Option<(&ServiceEntry, PlanPrice)> {
        let entry = self.services.get(service_id)?;
        let price = entry.plans.get(plan)?;
        Some((entry, *price))
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServiceEntry)> {
        self.services.iter()
    }

    /// Catalog shipped with the platform, used when the manifest omits one.
    pub fn builtin() -> Self {
        let mut services = IndexMap::new();
        services.insert(
            "cv-review".to_string(),
            ServiceEntry {
                name: "AI CV review".to_string(),
                plans: IndexMap::from([
                    ("basic".to_string(), PlanPrice { tokens: 5, price: 300 }),
                    ("pro".to_string(), PlanPrice { tokens: 12, price: 700 }),
                ]),
            },
        );
        services.insert(
            "cover-letter".to_string(),
            ServiceEntry {
                name: "Cover letter generator".to_string(),
                plans: IndexMap::from([(
                    "standard".to_string(),
                    PlanPrice { tokens: 8, price: 500 },
                )]),
            },
        );
        services.insert(
            "job-spotlight".to_string(),
            ServiceEntry {
                name: "Profile spotlight".to_string(),
                plans: IndexMap::from([
                    ("week".to_string(), PlanPrice { tokens: 10, price: 600 }),
                    (
                        "month".to_string(),
                        PlanPrice {
                            tokens: 30,
                            price: 1500,
                        },
                    ),
                ]),
            },
        );
        ServiceCatalog { services }
    }
}

/// One purchasable token pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPack {
    pub name: String,
    pub base_tokens: i64,
    pub bonus_tokens: i64,
    /// Real-money price in minor units. Packs are never wallet-payable.
    pub price: i64,
}

impl TokenPack {
    pub fn total_tokens(&self) -> i64 {
        self.base_tokens + self.bonus_tokens
    }
}

/// Immutable pack_id -> pack table, loaded once at process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenPackCatalog {
    packs: IndexMap<String, TokenPack>,
}

impl TokenPackCatalog {
    pub fn new(packs: IndexMap<String, TokenPack>) -> Self {
        TokenPackCatalog { packs }
    }

    pub fn lookup(&self, pack_id: &str) -> Option<&TokenPack> {
        self.packs.get(pack_id)
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TokenPack)> {
        self.packs.iter()
    }

    /// Packs shipped with the platform, used when the manifest omits them.
    pub fn builtin() -> Self {
        let mut packs = IndexMap::new();
        packs.insert(
            "starter".to_string(),
            TokenPack {
                name: "Starter pack".to_string(),
                base_tokens: 20,
                bonus_tokens: 5,
                price: 1000,
            },
        );
        packs.insert(
            "growth".to_string(),
            TokenPack {
                name: "Growth pack".to_string(),
                base_tokens: 50,
                bonus_tokens: 15,
                price: 2200,
            },
        );
        packs.insert(
            "career".to_string(),
            TokenPack {
                name: "Career pack".to_string(),
                base_tokens: 120,
                bonus_tokens: 40,
                price: 4800,
            },
        );
        TokenPackCatalog { packs }
    }
}
