//! Resource URI templates and static resource definitions.

use crate::types::{ResourceDefinition, ResourceTemplateDefinition};

pub fn list_templates() -> Vec<ResourceTemplateDefinition> {
    vec![
        ResourceTemplateDefinition {
            uri_template: "occupancy://session/{id}/current".to_string(),
            name: "Live Scene".to_string(),
            description: Some("Present count and demographics of the open window".to_string()),
            mime_type: Some("application/json".to_string()),
        },
        ResourceTemplateDefinition {
            uri_template: "occupancy://session/{id}/totals".to_string(),
            name: "Session Totals".to_string(),
            description: Some("Unique visitors since session start".to_string()),
            mime_type: Some("application/json".to_string()),
        },
        ResourceTemplateDefinition {
            uri_template: "occupancy://timeline/{id}/{from}/{to}".to_string(),
            name: "Timeline".to_string(),
            description: Some("Bucket states in a millisecond range".to_string()),
            mime_type: Some("application/json".to_string()),
        },
    ]
}

pub fn list_resources() -> Vec<ResourceDefinition> {
    vec![ResourceDefinition {
        uri: "occupancy://sessions".to_string(),
        name: "Sessions".to_string(),
        description: Some("All live and ended counting sessions".to_string()),
        mime_type: Some("application/json".to_string()),
    }]
}
