use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub employee_id: Option<String>,
    pub is_active: bool,
}

#[derive(FromRow)]
pub struct RefreshTokenRecord {
    pub id: u64,
    pub user_id: u64,
    pub revoked: bool,
}
