//! Template policy table
//!
//! Maps a lab template identifier to the ordered set of VM roles it
//! provisions. Table-driven so new templates are a row, not a branch.

use std::collections::HashMap;

/// Role a provisioned VM plays in the lab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmRole {
    Server,
    Client,
}

/// Mapping from template identifier to VM role list
pub struct TemplateCatalog {
    templates: HashMap<String, Vec<VmRole>>,
    fallback: Vec<VmRole>,
}

impl TemplateCatalog {
    /// The built-in policy: "rhcsa9-base" provisions one server and one
    /// client; every other template falls back to one server and two clients.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            "rhcsa9-base".to_string(),
            vec![VmRole::Server, VmRole::Client],
        );
        Self {
            templates,
            fallback: vec![VmRole::Server, VmRole::Client, VmRole::Client],
        }
    }

    /// Add or replace a template row
    pub fn register(&mut self, template_id: impl Into<String>, roles: Vec<VmRole>) {
        self.templates.insert(template_id.into(), roles);
    }

    /// Roles for `template_id`, falling back to the default row
    pub fn roles_for(&self, template_id: &str) -> &[VmRole] {
        self.templates
            .get(template_id)
            .map(Vec::as_slice)
            .unwrap_or(&self.fallback)
    }

    /// VM names for `template_id` under `prefix`
    ///
    /// A lone client is "<prefix>-client"; multiple clients are numbered
    /// "<prefix>-client1", "<prefix>-client2", ... Servers likewise.
    pub fn vm_names(&self, template_id: &str, prefix: &str) -> Vec<(VmRole, String)> {
        let roles = self.roles_for(template_id);
        let servers = roles.iter().filter(|r| **r == VmRole::Server).count();
        let clients = roles.iter().filter(|r| **r == VmRole::Client).count();

        let mut server_seen = 0;
        let mut client_seen = 0;
        roles
            .iter()
            .map(|role| {
                let name = match role {
                    VmRole::Server => {
                        server_seen += 1;
                        if servers > 1 {
                            format!("{}-server{}", prefix, server_seen)
                        } else {
                            format!("{}-server", prefix)
                        }
                    }
                    VmRole::Client => {
                        client_seen += 1;
                        if clients > 1 {
                            format!("{}-client{}", prefix, client_seen)
                        } else {
                            format!("{}-client", prefix)
                        }
                    }
                };
                (*role, name)
            })
            .collect()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_template_two_vms() {
        let catalog = TemplateCatalog::builtin();
        let names = catalog.vm_names("rhcsa9-base", "lab");
        assert_eq!(
            names,
            vec![
                (VmRole::Server, "lab-server".to_string()),
                (VmRole::Client, "lab-client".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_template_falls_back_to_three_vms() {
        let catalog = TemplateCatalog::builtin();
        let names = catalog.vm_names("rhcsa9-multi", "lab");
        assert_eq!(
            names,
            vec![
                (VmRole::Server, "lab-server".to_string()),
                (VmRole::Client, "lab-client1".to_string()),
                (VmRole::Client, "lab-client2".to_string()),
            ]
        );
    }

    #[test]
    fn test_registered_template_overrides_fallback() {
        let mut catalog = TemplateCatalog::builtin();
        catalog.register("rhcsa9-solo", vec![VmRole::Server]);

        assert_eq!(catalog.roles_for("rhcsa9-solo"), &[VmRole::Server]);
        let names = catalog.vm_names("rhcsa9-solo", "lab");
        assert_eq!(names, vec![(VmRole::Server, "lab-server".to_string())]);
    }
}
