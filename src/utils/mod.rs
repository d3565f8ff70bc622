pub mod db_utils;
pub mod template_cache;
