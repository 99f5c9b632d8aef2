use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = offices)]
pub struct Office {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub parent_office_id: Option<Uuid>,
    pub level: i32,
    pub manager: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = offices)]
pub struct NewOffice {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub parent_office_id: Option<Uuid>,
    pub level: i32,
    pub manager: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub office_id: Option<Uuid>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub office_id: Option<Uuid>,
    pub active: bool,
}

/// A routed document. `status`, `id_office_destination` and `user_id` are
/// only ever written by [`crate::workflow::ledger::append`].
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub document_number: String,
    pub case_number: String,
    pub subject: String,
    pub origen: DocumentOrigin,
    pub document_type_id: Uuid,
    pub area_origen_id: Uuid,
    pub gestion_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub folio: i32,
    pub reception_date: NaiveDate,
    pub response_deadline: Option<NaiveDate>,
    pub status: DocumentStatus,
    pub id_office_destination: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub document_number: String,
    pub case_number: String,
    pub subject: String,
    pub origen: DocumentOrigin,
    pub document_type_id: Uuid,
    pub area_origen_id: Uuid,
    pub gestion_id: Option<Uuid>,
    pub folio: i32,
    pub reception_date: NaiveDate,
    pub response_deadline: Option<NaiveDate>,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = movements)]
#[diesel(belongs_to(Document))]
pub struct Movement {
    pub id: Uuid,
    pub document_id: Uuid,
    pub sequence_number: i32,
    pub origin_office_id: Uuid,
    pub origin_user_id: Uuid,
    pub destination_office_id: Option<Uuid>,
    pub destination_user_id: Option<Uuid>,
    pub action: MovementAction,
    pub indication: Option<String>,
    pub observation: Option<String>,
    pub status: MovementStatus,
    pub receipt_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = movements)]
pub struct NewMovement {
    pub id: Uuid,
    pub document_id: Uuid,
    pub sequence_number: i32,
    pub origin_office_id: Uuid,
    pub origin_user_id: Uuid,
    pub destination_office_id: Option<Uuid>,
    pub destination_user_id: Option<Uuid>,
    pub action: MovementAction,
    pub indication: Option<String>,
    pub observation: Option<String>,
    pub status: MovementStatus,
    pub receipt_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = document_files)]
#[diesel(belongs_to(Document))]
pub struct DocumentFile {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub path: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_files)]
pub struct NewDocumentFile {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub path: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
        )]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                raw.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

text_enum! {
    DocumentStatus {
        InProcess => "IN_PROCESS",
        Completed => "COMPLETED",
        Rejected => "REJECTED",
        Archived => "ARCHIVED",
    }
}

text_enum! {
    DocumentOrigin {
        Internal => "INTERNAL",
        External => "EXTERNAL",
    }
}

text_enum! {
    MovementAction {
        Derivacion => "DERIVACION",
        Respuesta => "RESPUESTA",
        Rechazado => "RECHAZADO",
        Archivado => "ARCHIVADO",
        Otro => "OTRO",
    }
}

text_enum! {
    MovementStatus {
        Pending => "PENDING",
        Completed => "COMPLETED",
        Rejected => "REJECTED",
    }
}
