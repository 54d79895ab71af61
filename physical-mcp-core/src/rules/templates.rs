//! Built-in rule templates, offered to chat clients via the MCP
//! `list_rule_templates` tool so a user doesn't have to hand-write a
//! condition from scratch.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub condition: &'static str,
    pub priority: &'static str,
    pub cooldown_seconds: u64,
    pub icon: &'static str,
}

pub const TEMPLATES: &[RuleTemplate] = &[
    RuleTemplate {
        id: "person-detection",
        name: "Person detected",
        description: "Alert whenever a person enters the frame.",
        category: "security",
        condition: "a person is visible in the frame",
        priority: "medium",
        cooldown_seconds: 60,
        icon: "👤",
    },
    RuleTemplate {
        id: "person-at-door",
        name: "Person at the door",
        description: "Alert when someone is standing at the front door.",
        category: "security",
        condition: "a person is standing at the front door",
        priority: "high",
        cooldown_seconds: 60,
        icon: "🚪",
    },
    RuleTemplate {
        id: "package-delivered",
        name: "Package delivered",
        description: "Alert when a package is dropped off.",
        category: "security",
        condition: "a package or delivery box has been left at the door",
        priority: "medium",
        cooldown_seconds: 300,
        icon: "📦",
    },
    RuleTemplate {
        id: "unusual-activity",
        name: "Unusual activity",
        description: "Alert on activity that looks out of the ordinary.",
        category: "security",
        condition: "unusual or suspicious activity is happening",
        priority: "high",
        cooldown_seconds: 120,
        icon: "⚠️",
    },
    RuleTemplate {
        id: "pet-on-furniture",
        name: "Pet on furniture",
        description: "Alert when a pet climbs onto furniture.",
        category: "pets",
        condition: "a pet is on the couch, bed, or counter",
        priority: "low",
        cooldown_seconds: 300,
        icon: "🐾",
    },
    RuleTemplate {
        id: "pet-at-door",
        name: "Pet wants out",
        description: "Alert when a pet is waiting at the door.",
        category: "pets",
        condition: "a pet is waiting at the door",
        priority: "medium",
        cooldown_seconds: 120,
        icon: "🐕",
    },
    RuleTemplate {
        id: "baby-monitor",
        name: "Baby awake",
        description: "Alert when a baby in the crib appears awake or upset.",
        category: "family",
        condition: "a baby in the crib is awake, crying, or standing up",
        priority: "critical",
        cooldown_seconds: 30,
        icon: "👶",
    },
    RuleTemplate {
        id: "child-safety",
        name: "Child near hazard",
        description: "Alert when a child approaches a hazardous area.",
        category: "family",
        condition: "a child is near stairs, a pool, or the stove",
        priority: "critical",
        cooldown_seconds: 30,
        icon: "🧒",
    },
    RuleTemplate {
        id: "elderly-fall",
        name: "Possible fall",
        description: "Alert when a person appears to have fallen.",
        category: "family",
        condition: "a person appears to have fallen or is lying on the floor unexpectedly",
        priority: "critical",
        cooldown_seconds: 30,
        icon: "🆘",
    },
    RuleTemplate {
        id: "motion-alert",
        name: "Motion detected",
        description: "Alert on any significant motion in the scene.",
        category: "automation",
        condition: "significant motion is occurring in the frame",
        priority: "low",
        cooldown_seconds: 60,
        icon: "🏃",
    },
    RuleTemplate {
        id: "lights-left-on",
        name: "Lights left on",
        description: "Alert when lights are on and the room is empty.",
        category: "automation",
        condition: "the lights are on and no one is in the room",
        priority: "low",
        cooldown_seconds: 600,
        icon: "💡",
    },
    RuleTemplate {
        id: "stove-check",
        name: "Stove left on",
        description: "Alert when the stove appears on with no one nearby.",
        category: "automation",
        condition: "the stove or oven appears on and no one is in the kitchen",
        priority: "high",
        cooldown_seconds: 180,
        icon: "🔥",
    },
    RuleTemplate {
        id: "customer-entered",
        name: "Customer entered",
        description: "Alert when a customer walks into the store.",
        category: "business",
        condition: "a customer has just walked into the store",
        priority: "medium",
        cooldown_seconds: 30,
        icon: "🛎️",
    },
    RuleTemplate {
        id: "crowding-alert",
        name: "Crowding",
        description: "Alert when the space looks overcrowded.",
        category: "business",
        condition: "the area looks overcrowded or over capacity",
        priority: "high",
        cooldown_seconds: 120,
        icon: "👥",
    },
];

pub fn list_templates(category: Option<&str>) -> Vec<&'static RuleTemplate> {
    match category {
        Some(cat) => TEMPLATES.iter().filter(|t| t.category == cat).collect(),
        None => TEMPLATES.iter().collect(),
    }
}

pub fn get_template(template_id: &str) -> Option<&'static RuleTemplate> {
    TEMPLATES.iter().find(|t| t.id == template_id)
}

pub fn get_categories() -> Vec<&'static str> {
    let mut seen = Vec::new();
    for t in TEMPLATES {
        if !seen.contains(&t.category) {
            seen.push(t.category);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_template_ids_are_unique() {
        let mut ids: Vec<&str> = TEMPLATES.iter().map(|t| t.id).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn get_template_finds_known_id() {
        let t = get_template("baby-monitor").expect("template exists");
        assert_eq!(t.category, "family");
    }

    #[test]
    fn get_template_returns_none_for_unknown_id() {
        assert!(get_template("does-not-exist").is_none());
    }

    #[test]
    fn list_templates_filters_by_category() {
        let security = list_templates(Some("security"));
        assert!(security.iter().all(|t| t.category == "security"));
        assert!(!security.is_empty());
    }

    #[test]
    fn get_categories_has_no_duplicates() {
        let cats = get_categories();
        let mut sorted = cats.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(cats.len(), sorted.len());
    }
}
