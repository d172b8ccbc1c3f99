use std::sync::{Arc, RwLock};

use crate::error::DbError;

pub type Pod<T> = Arc<RwLock<T>>;
pub type ResultPod<T> = Result<Pod<T>, DbError>;
pub type DbResult<T = ()> = Result<T, DbError>;
