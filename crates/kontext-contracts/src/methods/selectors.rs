use super::registry::{MethodRegistry, MethodSpec, DEFAULT_METHOD};

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSelection {
    pub method: MethodSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodSelector {
    pub registry: MethodRegistry,
}

impl MethodSelector {
    pub fn new(registry: Option<MethodRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    pub fn select(&self, requested: Option<&str>) -> Result<MethodSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = if let Some(requested_value) = requested {
            if let Some(method) = self.registry.get(requested_value) {
                return Ok(MethodSelection {
                    method: method.clone(),
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            format!("Requested method '{requested_value}' is not available.")
        } else {
            "No method specified; using default.".to_string()
        };

        let Some(method) = self
            .registry
            .get(DEFAULT_METHOD)
            .or_else(|| self.registry.first())
            .cloned()
        else {
            return Err("No generation methods are registered.".to_string());
        };
        Ok(MethodSelection {
            method,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
