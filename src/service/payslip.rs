use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use sqlx::{MySql, MySqlPool, QueryBuilder, Transaction};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::db::{new_id, now_millis};
use crate::error::AppError;
use crate::model::payslip::{Component, SalaryStructure};

/// Outcome of resolving a structure's component references.
#[derive(Debug, Default, PartialEq)]
pub struct ResolutionPlan {
    /// Components in reference order, clones substituted for defaults
    pub components: Vec<Component>,
    /// Structure-owned copies that must be inserted
    pub clones: Vec<Component>,
    /// Reference list after substitution
    pub references: Vec<String>,
}

impl ResolutionPlan {
    pub fn changed(&self) -> bool {
        !self.clones.is_empty()
    }
}

/// Walks `references` in order and swaps every default component for a
/// structure-owned copy. References that no longer resolve are kept as-is.
pub fn plan_resolution(
    structure_id: &str,
    references: &[String],
    fetched: &HashMap<String, Component>,
    now: i64,
    mut new_id: impl FnMut() -> String,
) -> ResolutionPlan {
    let mut plan = ResolutionPlan::default();

    for reference in references {
        let Some(component) = fetched.get(reference) else {
            plan.references.push(reference.clone());
            continue;
        };

        if component.is_default {
            let copy = component.clone_for(structure_id, new_id(), now);
            plan.references.push(copy.id.clone());
            plan.components.push(copy.clone());
            plan.clones.push(copy);
        } else {
            plan.references.push(reference.clone());
            plan.components.push(component.clone());
        }
    }

    plan
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentGroup {
    pub count: usize,
    pub components: Vec<Component>,
}

/// Groups components by type, keeping their order inside each group.
pub fn group_by_type(components: Vec<Component>) -> BTreeMap<String, ComponentGroup> {
    let mut groups: BTreeMap<String, ComponentGroup> = BTreeMap::new();
    for component in components {
        let group = groups
            .entry(component.component_type.clone())
            .or_insert_with(|| ComponentGroup {
                count: 0,
                components: Vec::new(),
            });
        group.count += 1;
        group.components.push(component);
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ComponentAmount {
    pub name: String,
    pub code: String,
    pub value: String,
    pub amount: f64,
}

pub fn amounts_by_type(components: &[Component]) -> BTreeMap<String, Vec<ComponentAmount>> {
    let mut groups: BTreeMap<String, Vec<ComponentAmount>> = BTreeMap::new();
    for c in components {
        groups
            .entry(c.component_type.clone())
            .or_default()
            .push(ComponentAmount {
                name: c.name.clone(),
                code: c.code.clone(),
                value: c.value.clone(),
                amount: c.amount(),
            });
    }
    groups
}

/// Payroll rounding to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn total_of_type(components: &[Component], component_type: &str) -> f64 {
    round2(
        components
            .iter()
            .filter(|c| c.component_type == component_type)
            .map(Component::amount)
            .sum(),
    )
}

pub async fn load_references(
    tx: &mut Transaction<'_, MySql>,
    structure_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT component_id FROM structure_components WHERE structure_id = ? ORDER BY position",
    )
    .bind(structure_id)
    .fetch_all(&mut **tx)
    .await
}

/// Replaces the structure's reference list.
pub async fn write_references(
    tx: &mut Transaction<'_, MySql>,
    structure_id: &str,
    references: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM structure_components WHERE structure_id = ?")
        .bind(structure_id)
        .execute(&mut **tx)
        .await?;

    if references.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<MySql> =
        QueryBuilder::new("INSERT INTO structure_components (structure_id, position, component_id) ");
    builder.push_values(references.iter().enumerate(), |mut b, (position, id)| {
        b.push_bind(structure_id.to_string())
            .push_bind(position as i32)
            .push_bind(id.clone());
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

pub async fn insert_component(
    tx: &mut Transaction<'_, MySql>,
    c: &Component,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO components
            (id, group_id, component_type, show_on_payslip, name, code, calculation_type,
             value, min_value, max_value, test_amount, taxable, leave_based, ctc,
             adjustment_balanced, is_default, is_deleted, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&c.id)
    .bind(&c.group_id)
    .bind(&c.component_type)
    .bind(c.show_on_payslip)
    .bind(&c.name)
    .bind(&c.code)
    .bind(c.calculation_type)
    .bind(&c.value)
    .bind(&c.min_value)
    .bind(&c.max_value)
    .bind(&c.test_amount)
    .bind(c.taxable)
    .bind(c.leave_based)
    .bind(c.ctc)
    .bind(c.adjustment_balanced)
    .bind(c.is_default)
    .bind(c.is_deleted)
    .bind(c.created_at)
    .bind(c.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn fetch_components(
    tx: &mut Transaction<'_, MySql>,
    ids: &[String],
) -> Result<HashMap<String, Component>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder: QueryBuilder<MySql> =
        QueryBuilder::new("SELECT * FROM components WHERE is_deleted = FALSE AND id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");

    let rows = builder
        .build_query_as::<Component>()
        .fetch_all(&mut **tx)
        .await?;
    Ok(rows.into_iter().map(|c| (c.id.clone(), c)).collect())
}

/// Resolves a structure's components, cloning defaults on first read.
/// The structure row stays locked until the rewritten references commit.
pub async fn resolve_structure(
    pool: &MySqlPool,
    structure_id: &str,
) -> Result<(SalaryStructure, Vec<Component>), AppError> {
    let mut tx = pool.begin().await?;

    let structure = sqlx::query_as::<_, SalaryStructure>(
        "SELECT * FROM salary_structures WHERE id = ? AND is_deleted = FALSE FOR UPDATE",
    )
    .bind(structure_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Salary structure not found"))?;

    let references = load_references(&mut tx, structure_id).await?;
    let fetched = fetch_components(&mut tx, &references).await?;
    let plan = plan_resolution(structure_id, &references, &fetched, now_millis(), new_id);

    if plan.changed() {
        for clone in &plan.clones {
            insert_component(&mut tx, clone).await?;
        }
        write_references(&mut tx, structure_id, &plan.references).await?;
        info!(
            structure_id,
            cloned = plan.clones.len(),
            "Cloned default components into structure"
        );
    } else {
        debug!(structure_id, "Structure already owns its components");
    }

    tx.commit().await?;
    Ok((structure, plan.components))
}

/// Same as [`resolve_structure`] but looks the structure up by group name.
pub async fn resolve_by_group_name(
    pool: &MySqlPool,
    group_name: &str,
) -> Result<(SalaryStructure, Vec<Component>), AppError> {
    let structure_id = sqlx::query_scalar::<_, String>(
        "SELECT id FROM salary_structures WHERE group_name = ? AND is_deleted = FALSE LIMIT 1",
    )
    .bind(group_name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Salary structure {group_name} not found")))?;

    resolve_structure(pool, &structure_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payslip::{CalculationType, DEDUCTION, EARNING};

    fn component(id: &str, code: &str, kind: &str, value: &str, is_default: bool) -> Component {
        Component {
            id: id.into(),
            group_id: None,
            component_type: kind.into(),
            show_on_payslip: true,
            name: code.to_uppercase(),
            code: code.into(),
            calculation_type: CalculationType::Fixed,
            value: value.into(),
            min_value: None,
            max_value: None,
            test_amount: "0".into(),
            taxable: false,
            leave_based: false,
            ctc: true,
            adjustment_balanced: false,
            is_default,
            is_deleted: false,
            created_at: 1,
            updated_at: None,
        }
    }

    fn ids(prefix: &'static str) -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("{prefix}{n}")
        }
    }

    #[test]
    fn defaults_are_cloned_per_structure() {
        let d = component("D", "basic", EARNING, "1000", true);
        let fetched: HashMap<_, _> = [("D".to_string(), d.clone())].into();
        let refs = vec!["D".to_string()];

        let s1 = plan_resolution("S1", &refs, &fetched, 5, ids("S1-"));
        let s2 = plan_resolution("S2", &refs, &fetched, 5, ids("S2-"));

        assert_eq!(s1.references, vec!["S1-1"]);
        assert_eq!(s2.references, vec!["S2-1"]);
        assert_eq!(s1.clones[0].group_id.as_deref(), Some("S1"));
        assert!(!s1.clones[0].is_default);
        assert_eq!(s1.clones[0].value, "1000");
        // the shared template is untouched
        assert_eq!(fetched["D"], d);
        assert!(fetched["D"].is_default);
    }

    #[test]
    fn owned_components_pass_through_in_order() {
        let fetched: HashMap<_, _> = [
            ("A".to_string(), component("A", "hra", EARNING, "500", false)),
            ("D".to_string(), component("D", "basic", EARNING, "1000", true)),
        ]
        .into();
        let refs = vec!["A".to_string(), "GONE".to_string(), "D".to_string()];

        let plan = plan_resolution("S", &refs, &fetched, 0, ids("new-"));

        assert!(plan.changed());
        assert_eq!(plan.references, vec!["A", "GONE", "new-1"]);
        let codes: Vec<_> = plan.components.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["hra", "basic"]);
    }

    #[test]
    fn already_resolved_structure_is_unchanged() {
        let fetched: HashMap<_, _> =
            [("A".to_string(), component("A", "hra", EARNING, "500", false))].into();
        let plan = plan_resolution("S", &["A".to_string()], &fetched, 0, ids("x"));
        assert!(!plan.changed());
        assert_eq!(plan.references, vec!["A"]);
    }

    #[test]
    fn totals_round_to_cents() {
        let comps = vec![
            component("1", "basic", EARNING, "1000.111", false),
            component("2", "hra", EARNING, "200.2", false),
            component("3", "pf", DEDUCTION, "120.333", false),
            component("4", "bonus", EARNING, "10% of basic", false),
        ];
        assert_eq!(total_of_type(&comps, EARNING), 1200.31);
        assert_eq!(total_of_type(&comps, DEDUCTION), 120.33);
        assert_eq!(total_of_type(&comps, "REIMBURSEMENT"), 0.0);
    }

    #[test]
    fn groups_keep_counts_and_amounts() {
        let comps = vec![
            component("1", "basic", EARNING, "1000", false),
            component("2", "pf", DEDUCTION, "120", false),
            component("3", "hra", EARNING, "400", false),
        ];

        let amounts = amounts_by_type(&comps);
        assert_eq!(amounts[EARNING].len(), 2);
        assert_eq!(amounts[DEDUCTION][0].amount, 120.0);

        let grouped = group_by_type(comps);
        assert_eq!(grouped[EARNING].count, 2);
        assert_eq!(grouped[EARNING].components[1].code, "hra");
    }
}
