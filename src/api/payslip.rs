use crate::{
    api::{Page, PageQuery},
    auth::auth::AuthUser,
    db::{new_id, now_millis},
    error::AppError,
    model::payslip::{CalculationType, Component, SalaryStructure},
    service::payslip::{
        ComponentAmount, ComponentGroup, amounts_by_type, group_by_type, insert_component, load_references,
        resolve_by_group_name, resolve_structure, write_references,
    },
    utils::db_utils::{build_update_sql, execute_update, reject_nulls},
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::collections::BTreeMap;
use tracing::info;
use utoipa::ToSchema;

const STRUCTURE_EDITABLE: &[&str] = &["group_name", "code", "description"];
const STRUCTURE_REQUIRED: &[&str] = &["group_name", "code"];

/// Identity, ownership, flags and payslip settings stay fixed after creation.
const COMPONENT_EDITABLE: &[&str] = &[
    "component_type",
    "name",
    "code",
    "calculation_type",
    "value",
    "min_value",
    "max_value",
    "test_amount",
];
const COMPONENT_REQUIRED: &[&str] = &["name", "code", "value", "test_amount"];

fn default_true() -> bool {
    true
}

fn default_test_amount() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewComponent {
    #[schema(example = "EARNING")]
    pub component_type: String,
    #[serde(default = "default_true")]
    pub show_on_payslip: bool,
    #[schema(example = "Basic")]
    pub name: String,
    #[schema(example = "BASIC")]
    pub code: String,
    pub calculation_type: CalculationType,
    #[schema(example = "25000")]
    pub value: String,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    #[serde(default = "default_test_amount")]
    pub test_amount: String,
    #[serde(default)]
    pub taxable: bool,
    #[serde(default)]
    pub leave_based: bool,
    #[serde(default)]
    pub ctc: bool,
    #[serde(default)]
    pub adjustment_balanced: bool,
}

impl NewComponent {
    fn into_component(self, group_id: Option<String>, is_default: bool, now: i64) -> Result<Component, AppError> {
        if self.name.trim().is_empty() || self.code.trim().is_empty() || self.component_type.trim().is_empty() {
            return Err(AppError::bad_request("Component name, code and type are required"));
        }

        Ok(Component {
            id: new_id(),
            group_id,
            component_type: self.component_type.trim().to_uppercase(),
            show_on_payslip: self.show_on_payslip,
            name: self.name.trim().to_string(),
            code: self.code.trim().to_string(),
            calculation_type: self.calculation_type,
            value: self.value,
            min_value: self.min_value,
            max_value: self.max_value,
            test_amount: self.test_amount,
            taxable: self.taxable,
            leave_based: self.leave_based,
            ctc: self.ctc,
            adjustment_balanced: self.adjustment_balanced,
            is_default,
            is_deleted: false,
            created_at: now,
            updated_at: None,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateStructure {
    #[schema(example = "India")]
    pub group_name: String,
    #[schema(example = "IND")]
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StructureComponents {
    pub structure: SalaryStructure,
    pub components: BTreeMap<String, ComponentGroup>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupPayslip {
    pub structure: SalaryStructure,
    pub components: BTreeMap<String, Vec<ComponentAmount>>,
}

/// Rejects calculation types the store could not read back and stores
/// `component_type` uppercased, as on create.
fn normalize_component_patch(mut body: Value) -> Result<Value, AppError> {
    if let Some(kind) = body.get("calculation_type") {
        let valid = kind
            .as_str()
            .is_some_and(|s| s.parse::<CalculationType>().is_ok());
        if !valid {
            return Err(AppError::bad_request("calculation_type must be fixed or formula"));
        }
    }

    if let Some(kind) = body.get_mut("component_type") {
        let normalized = kind
            .as_str()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::bad_request("component_type must be a non-empty string"))?;
        *kind = Value::String(normalized);
    }
    Ok(body)
}

/// Add a default component
#[utoipa::path(
    post,
    path = "/api/payslip/default",
    request_body = NewComponent,
    responses(
        (status = 201, description = "Default component created", body = Component),
        (status = 400, description = "Missing name, code or type")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn add_default_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<NewComponent>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let component = payload.into_inner().into_component(None, true, now_millis())?;

    let mut tx = pool.begin().await?;
    insert_component(&mut tx, &component).await?;
    tx.commit().await?;

    info!(component_id = %component.id, code = %component.code, "Default component added");
    Ok(HttpResponse::Created().json(component))
}

/// List default components
#[utoipa::path(
    get,
    path = "/api/payslip/default",
    params(PageQuery),
    responses((status = 200, description = "Shared default components", body = ComponentListResponse)),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn list_default_components(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = query.bounds();

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM components WHERE is_default = TRUE AND is_deleted = FALSE",
    )
    .fetch_one(pool.get_ref())
    .await?;

    let components = sqlx::query_as::<_, Component>(
        "SELECT * FROM components WHERE is_default = TRUE AND is_deleted = FALSE ORDER BY created_at LIMIT ? OFFSET ?",
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(components, page, per_page, total)))
}

/// Create a salary structure
#[utoipa::path(
    post,
    path = "/api/payslip/structure",
    request_body = CreateStructure,
    responses(
        (status = 201, description = "Structure created with every default component attached", body = SalaryStructure),
        (status = 400, description = "Missing group name or code")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn create_structure(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateStructure>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let p = payload.into_inner();
    if p.group_name.trim().is_empty() || p.code.trim().is_empty() {
        return Err(AppError::bad_request("Group name and code are required"));
    }

    let structure = SalaryStructure {
        id: new_id(),
        group_name: p.group_name.trim().to_string(),
        code: p.code.trim().to_string(),
        description: p.description,
        is_deleted: false,
        created_at: now_millis(),
        updated_at: None,
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO salary_structures (id, group_name, code, description, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&structure.id)
    .bind(&structure.group_name)
    .bind(&structure.code)
    .bind(&structure.description)
    .bind(structure.created_at)
    .execute(&mut *tx)
    .await?;

    let defaults = sqlx::query_scalar::<_, String>(
        "SELECT id FROM components WHERE is_default = TRUE AND is_deleted = FALSE ORDER BY created_at",
    )
    .fetch_all(&mut *tx)
    .await?;
    write_references(&mut tx, &structure.id, &defaults).await?;
    tx.commit().await?;

    info!(structure_id = %structure.id, group = %structure.group_name, defaults = defaults.len(), "Salary structure created");
    Ok(HttpResponse::Created().json(structure))
}

/// List salary structures
#[utoipa::path(
    get,
    path = "/api/payslip/structure",
    params(PageQuery),
    responses((status = 200, description = "Live structures", body = StructureListResponse)),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn list_structures(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, per_page, offset) = query.bounds();

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM salary_structures WHERE is_deleted = FALSE")
        .fetch_one(pool.get_ref())
        .await?;

    let structures = sqlx::query_as::<_, SalaryStructure>(
        "SELECT * FROM salary_structures WHERE is_deleted = FALSE ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(structures, page, per_page, total)))
}

/// Names of every live structure group
#[utoipa::path(
    get,
    path = "/api/payslip/structure/names",
    responses((status = 200, description = "Group names", body = [String])),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn structure_names(_auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, AppError> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT group_name FROM salary_structures WHERE is_deleted = FALSE ORDER BY group_name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(names))
}

/// Edit a salary structure
#[utoipa::path(
    patch,
    path = "/api/payslip/structure/{id}",
    params(("id", Path, description = "Structure ID")),
    request_body(content = Object, description = "Any of group_name, code, description"),
    responses(
        (status = 200, description = "Structure updated"),
        (status = 400, description = "Unknown or read-only field"),
        (status = 404, description = "Structure not found")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn edit_structure(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let live = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM salary_structures WHERE id = ? AND is_deleted = FALSE)",
    )
    .bind(&id)
    .fetch_one(pool.get_ref())
    .await?;
    if !live {
        return Err(AppError::not_found("Salary structure not found"));
    }

    let update = build_update_sql("salary_structures", &body, STRUCTURE_EDITABLE, "id", &id, now_millis())?;
    reject_nulls(&body, STRUCTURE_REQUIRED)?;
    execute_update(pool.get_ref(), update).await?;

    info!(structure_id = %id, by = %auth.username, "Salary structure updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Salary structure updated successfully" })))
}

/// Soft delete a salary structure and the components it owns
#[utoipa::path(
    delete,
    path = "/api/payslip/structure/{id}",
    params(("id", Path, description = "Structure ID")),
    responses(
        (status = 204, description = "Structure deleted"),
        (status = 404, description = "Structure not found")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn delete_structure(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    let now = now_millis();

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE salary_structures SET is_deleted = TRUE, updated_at = ? WHERE id = ? AND is_deleted = FALSE",
    )
    .bind(now)
    .bind(&id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Salary structure not found"));
    }

    let owned = sqlx::query(
        "UPDATE components SET is_deleted = TRUE, updated_at = ? WHERE group_id = ? AND is_default = FALSE AND is_deleted = FALSE",
    )
    .bind(now)
    .bind(&id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(structure_id = %id, components = owned.rows_affected(), by = %auth.username, "Salary structure deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Components of a structure grouped by type
#[utoipa::path(
    get,
    path = "/api/payslip/structure/{id}/components",
    params(("id", Path, description = "Structure ID")),
    responses(
        (status = 200, description = "Grouped components with counts", body = StructureComponents),
        (status = 404, description = "Structure not found")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn structure_components(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let (structure, components) = resolve_structure(pool.get_ref(), &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(StructureComponents {
        structure,
        components: group_by_type(components),
    }))
}

/// Append a component to a structure
#[utoipa::path(
    post,
    path = "/api/payslip/structure/{id}/component",
    params(("id", Path, description = "Structure ID")),
    request_body = NewComponent,
    responses(
        (status = 201, description = "Component added", body = Component),
        (status = 404, description = "Structure not found")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn add_structure_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<NewComponent>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let structure_id = path.into_inner();
    let component = payload
        .into_inner()
        .into_component(Some(structure_id.clone()), false, now_millis())?;

    let mut tx = pool.begin().await?;
    sqlx::query_scalar::<_, String>("SELECT id FROM salary_structures WHERE id = ? AND is_deleted = FALSE FOR UPDATE")
        .bind(&structure_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Salary structure not found"))?;

    insert_component(&mut tx, &component).await?;
    let mut references = load_references(&mut tx, &structure_id).await?;
    references.push(component.id.clone());
    write_references(&mut tx, &structure_id, &references).await?;
    tx.commit().await?;

    info!(structure_id = %structure_id, component_id = %component.id, "Component added to structure");
    Ok(HttpResponse::Created().json(component))
}

/// Edit a component
#[utoipa::path(
    patch,
    path = "/api/payslip/component/{id}",
    params(("id", Path, description = "Component ID")),
    request_body(content = Object, description = "Any of component_type, name, code, calculation_type, value, min_value, max_value, test_amount"),
    responses(
        (status = 200, description = "Component updated"),
        (status = 400, description = "Unknown or read-only field"),
        (status = 404, description = "Component not found")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn edit_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    let body = normalize_component_patch(body.into_inner())?;
    reject_nulls(&body, COMPONENT_REQUIRED)?;

    // Defaults are shared templates; structures edit their own copies
    let is_default = sqlx::query_scalar::<_, bool>("SELECT is_default FROM components WHERE id = ? AND is_deleted = FALSE")
        .bind(&id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Component not found"))?;
    if is_default {
        return Err(AppError::bad_request("Default components cannot be edited"));
    }

    let update = build_update_sql("components", &body, COMPONENT_EDITABLE, "id", &id, now_millis())?;
    execute_update(pool.get_ref(), update).await?;

    info!(component_id = %id, by = %auth.username, "Component updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Component updated successfully" })))
}

/// Soft delete a component and detach it from every structure
#[utoipa::path(
    delete,
    path = "/api/payslip/component/{id}",
    params(("id", Path, description = "Component ID")),
    responses(
        (status = 204, description = "Component deleted"),
        (status = 404, description = "Component not found")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn delete_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let result = sqlx::query("UPDATE components SET is_deleted = TRUE, updated_at = ? WHERE id = ? AND is_deleted = FALSE")
        .bind(now_millis())
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Component not found"));
    }

    let detached = sqlx::query("DELETE FROM structure_components WHERE component_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(component_id = %id, structures = detached.rows_affected(), by = %auth.username, "Component deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Component amounts for a structure group
#[utoipa::path(
    get,
    path = "/api/payslip/group/{name}",
    params(("name", Path, description = "Structure group name")),
    responses(
        (status = 200, description = "Amounts grouped by component type", body = GroupPayslip),
        (status = 404, description = "Structure not found")
    ),
    tag = "Payslip",
    security(("bearer_auth" = []))
)]
pub async fn group_components(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let (structure, components) = resolve_by_group_name(pool.get_ref(), &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(GroupPayslip {
        components: amounts_by_type(&components),
        structure,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db_utils::SqlValue;

    fn basic() -> NewComponent {
        serde_json::from_value(json!({
            "component_type": "earning",
            "name": " Basic ",
            "code": "BASIC",
            "calculation_type": "fixed",
            "value": "25000"
        }))
        .unwrap()
    }

    #[test]
    fn new_component_fills_defaults() {
        let c = basic().into_component(Some("s-1".into()), false, 42).unwrap();
        assert_eq!(c.component_type, "EARNING");
        assert_eq!(c.name, "Basic");
        assert_eq!(c.group_id.as_deref(), Some("s-1"));
        assert!(c.show_on_payslip);
        assert_eq!(c.test_amount, "0");
        assert!(!c.is_default && !c.is_deleted && !c.taxable);
        assert_eq!(c.created_at, 42);
    }

    #[test]
    fn new_component_requires_code() {
        let mut p = basic();
        p.code = " ".into();
        assert!(p.into_component(None, true, 0).is_err());
    }

    #[test]
    fn component_patch_rejects_settings_and_bad_calculation() {
        assert!(normalize_component_patch(json!({"calculation_type": "formula"})).is_ok());
        assert!(normalize_component_patch(json!({"calculation_type": "guess"})).is_err());

        let flags = build_update_sql("components", &json!({"is_default": false}), COMPONENT_EDITABLE, "id", "c", 0);
        assert!(flags.is_err());
        let settings = build_update_sql("components", &json!({"taxable": true}), COMPONENT_EDITABLE, "id", "c", 0);
        assert!(settings.is_err());
    }

    #[test]
    fn component_patch_uppercases_type() {
        let body = normalize_component_patch(json!({"component_type": " earning ", "value": "1000"})).unwrap();
        assert_eq!(body["component_type"], "EARNING");
        assert_eq!(body["value"], "1000");

        let update = build_update_sql("components", &body, COMPONENT_EDITABLE, "id", "c", 0).unwrap();
        assert!(matches!(&update.values[0], SqlValue::String(s) if s == "EARNING"));

        assert!(normalize_component_patch(json!({"component_type": "  "})).is_err());
        assert!(normalize_component_patch(json!({"component_type": null})).is_err());
    }
}
