use std::collections::{HashMap, HashSet};

use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewOffice, Office, User};
use crate::schema::{offices, users};
use crate::workflow::error::{WorkflowError, WorkflowResult};

pub fn find_office(conn: &mut PgConnection, office_id: Uuid) -> QueryResult<Option<Office>> {
    offices::table.find(office_id).first(conn).optional()
}

pub fn require_office(conn: &mut PgConnection, office_id: Uuid) -> WorkflowResult<Office> {
    find_office(conn, office_id)?.ok_or_else(|| WorkflowError::not_found("office", office_id))
}

pub fn find_user(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Option<User>> {
    users::table.find(user_id).first(conn).optional()
}

pub fn require_user(conn: &mut PgConnection, user_id: Uuid) -> WorkflowResult<User> {
    find_user(conn, user_id)?.ok_or_else(|| WorkflowError::not_found("user", user_id))
}

pub fn active_users(conn: &mut PgConnection, office_id: Uuid) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::office_id.eq(office_id))
        .filter(users::active.eq(true))
        .order(users::name.asc())
        .load(conn)
}

pub fn list_offices(conn: &mut PgConnection) -> QueryResult<Vec<Office>> {
    offices::table.order(offices::code.asc()).load(conn)
}

#[derive(Debug, Serialize)]
pub struct OfficeNode {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub level: i32,
    pub manager: Option<String>,
    pub active: bool,
    pub children: Vec<OfficeNode>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("office {office} references missing parent {parent}")]
    DanglingParent { office: String, parent: Uuid },
    #[error("office {office} is part of a parent cycle")]
    Cycle { office: String },
}

pub fn build_tree(offices: Vec<Office>) -> Result<Vec<OfficeNode>, TreeError> {
    let by_id: HashMap<Uuid, &Office> = offices.iter().map(|office| (office.id, office)).collect();

    for office in &offices {
        if let Some(parent) = office.parent_office_id {
            if !by_id.contains_key(&parent) {
                return Err(TreeError::DanglingParent {
                    office: office.code.clone(),
                    parent,
                });
            }
        }

        let mut visited = HashSet::from([office.id]);
        let mut cursor = office.parent_office_id;
        while let Some(parent) = cursor {
            if !visited.insert(parent) {
                return Err(TreeError::Cycle {
                    office: office.code.clone(),
                });
            }
            cursor = by_id.get(&parent).and_then(|office| office.parent_office_id);
        }
    }

    let mut children: HashMap<Option<Uuid>, Vec<Office>> = HashMap::new();
    for office in offices {
        children.entry(office.parent_office_id).or_default().push(office);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.code.cmp(&b.code));
    }

    Ok(attach(None, &mut children))
}

fn attach(parent: Option<Uuid>, children: &mut HashMap<Option<Uuid>, Vec<Office>>) -> Vec<OfficeNode> {
    let Some(siblings) = children.remove(&parent) else {
        return Vec::new();
    };
    siblings
        .into_iter()
        .map(|office| OfficeNode {
            children: attach(Some(office.id), children),
            id: office.id,
            code: office.code,
            name: office.name,
            level: office.level,
            manager: office.manager,
            active: office.active,
        })
        .collect()
}

struct SeedOffice {
    code: &'static str,
    name: &'static str,
    parent: Option<&'static str>,
    level: i32,
    manager: &'static str,
}

const STANDARD_OFFICES: &[SeedOffice] = &[
    SeedOffice { code: "MDP", name: "Mesa de Partes", parent: None, level: 1, manager: "Mesa de Partes" },
    SeedOffice { code: "MUNI", name: "Municipalidad", parent: None, level: 1, manager: "Alcalde" },
    SeedOffice { code: "OG", name: "Oficina General", parent: Some("MUNI"), level: 2, manager: "Director General" },
    SeedOffice { code: "LEG", name: "Oficina Legal", parent: Some("OG"), level: 3, manager: "Jefe Legal" },
    SeedOffice { code: "CONT", name: "Oficina de Contabilidad", parent: Some("OG"), level: 3, manager: "Jefe Contable" },
    SeedOffice { code: "ARCH", name: "Archivo Central", parent: Some("OG"), level: 3, manager: "Encargado de Archivo" },
];

pub fn seed_standard_offices(conn: &mut PgConnection) -> QueryResult<usize> {
    conn.transaction(|conn| {
        let existing: i64 = offices::table.count().get_result(conn)?;
        if existing > 0 {
            return Ok(0);
        }

        let mut ids: HashMap<&str, Uuid> = HashMap::new();
        for seed in STANDARD_OFFICES {
            let id = Uuid::new_v4();
            let row = NewOffice {
                id,
                code: seed.code.to_string(),
                name: seed.name.to_string(),
                parent_office_id: seed.parent.and_then(|code| ids.get(code).copied()),
                level: seed.level,
                manager: Some(seed.manager.to_string()),
                active: true,
            };
            diesel::insert_into(offices::table).values(&row).execute(conn)?;
            ids.insert(seed.code, id);
        }
        Ok(STANDARD_OFFICES.len())
    })
}
