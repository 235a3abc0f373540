// changewatch-core/src/domain/dashboard.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::variable::Variable;

/// One dashboard panel: a named group of variables charted together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub name: String,
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub test_id: i32,
    pub panels: Vec<Panel>,
}

/// Panels sort by name; a group sorts before a same-named single variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PanelKind {
    Group,
    Single,
}

impl Dashboard {
    /// Groups variables into panels. Each named group is one panel; an
    /// ungrouped variable gets a panel of its own, named after it.
    pub fn build(test_id: i32, variables: &[Variable]) -> Self {
        let mut panels: BTreeMap<(String, PanelKind), Vec<Variable>> = BTreeMap::new();
        for variable in variables {
            let key = match &variable.group {
                Some(group) => (group.clone(), PanelKind::Group),
                None => (variable.name.clone(), PanelKind::Single),
            };
            panels.entry(key).or_default().push(variable.clone());
        }

        let panels = panels
            .into_iter()
            .map(|((name, _), mut variables)| {
                variables.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
                Panel { name, variables }
            })
            .collect();

        Self { test_id, panels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::variable::LabelBinding;

    fn var(name: &str, group: Option<&str>, order: i32) -> Variable {
        let mut v = Variable::new(name, vec![LabelBinding::new("v", "urn:x:1", "$.v")]);
        v.group = group.map(str::to_string);
        v.order = order;
        v
    }

    #[test]
    fn test_groups_become_panels() {
        let vars = vec![
            var("p99", Some("latency"), 2),
            var("throughput", None, 0),
            var("p50", Some("latency"), 1),
        ];
        let dashboard = Dashboard::build(3, &vars);
        let names: Vec<&str> = dashboard.panels.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["latency", "throughput"]);

        let latency: Vec<&str> = dashboard.panels[0]
            .variables
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(latency, vec!["p50", "p99"]);
    }

    #[test]
    fn test_ungrouped_variable_named_like_a_group_keeps_its_panel() {
        let vars = vec![var("io", None, 0), var("read", Some("io"), 0), var("write", Some("io"), 1)];
        let dashboard = Dashboard::build(3, &vars);
        let panels: Vec<(&str, usize)> = dashboard
            .panels
            .iter()
            .map(|p| (p.name.as_str(), p.variables.len()))
            .collect();
        assert_eq!(panels, vec![("io", 2), ("io", 1)]);
        assert_eq!(dashboard.panels[1].variables[0].name, "io");
    }

    #[test]
    fn test_empty_test_has_no_panels() {
        assert!(Dashboard::build(1, &[]).panels.is_empty());
    }
}
