use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

// ============================================================================
// Health Reporting
// ============================================================================
//
// Watchers and the facade report component health to a shared board; a
// supervising collaborator reads the aggregated snapshot to decide whether to
// restart a watcher or the whole connection.
//
// ============================================================================

/// Health status of a component.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded(_))
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

/// Health information for a single component.
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

/// Aggregated system health snapshot.
#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

/// Shared health board. Updates come from watcher tasks; snapshots go to the
/// facade. The lock is never held across an await point.
#[derive(Default)]
pub struct HealthBoard {
    components: RwLock<HashMap<String, ComponentHealth>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest status of one component.
    pub fn update(
        &self,
        component: impl Into<String>,
        status: HealthStatus,
        details: Option<String>,
    ) {
        let name = component.into();

        tracing::debug!(
            component = %name,
            status = ?status,
            "Updated component health"
        );

        let health = ComponentHealth {
            name: name.clone(),
            status,
            last_check: Utc::now(),
            details,
        };

        if let Ok(mut components) = self.components.write() {
            components.insert(name, health);
        }
    }

    /// Aggregate an overall status: any unhealthy component wins, then any
    /// degraded one.
    pub fn system_health(&self) -> SystemHealth {
        let components = self
            .components
            .read()
            .map(|c| c.clone())
            .unwrap_or_default();

        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        let overall_status = if !unhealthy_components.is_empty() {
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        };

        SystemHealth {
            overall_status,
            components,
            check_time: Utc::now(),
        }
    }
}
