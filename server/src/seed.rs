//! Demo roles, permissions and actors for local development.

use anyhow::{Context, Result};
use chrono::Utc;
use entity::{actors, permissions, role_assignments, role_permissions, roles};
use platform_authn::{FieldCipher, hash_password};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait, Set,
    TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::permissions::{PROFILE_READ, SESSION_REFRESH, USER_READ};

pub const DOCTOR_USERNAME: &str = "dr.house";
pub const DOCTOR_PHONE: &str = "+15550100";

/// `(code, description, active)`
const PERMISSIONS: [(&str, &str, bool); 8] = [
    (PROFILE_READ, "Read own profile", true),
    (SESSION_REFRESH, "Renew a session token", true),
    (USER_READ, "Look up other actors", true),
    ("user.create", "Register actors", true),
    ("patient.read", "Read patient records", true),
    ("consultation.read", "Read consultations", true),
    ("consultation.write", "Write consultations", true),
    ("billing.export", "Export billing data", false),
];

/// `(code, name, granted permission codes)`
const ROLES: [(&str, &str, &[&str]); 4] = [
    ("0", "SuperAdmin", &[]),
    ("1", "Admin", &[]),
    (
        "doctor",
        "Doctor",
        &[
            PROFILE_READ,
            SESSION_REFRESH,
            "patient.read",
            "consultation.read",
            "billing.export",
        ],
    ),
    (
        "reception",
        "Receptionist",
        &[PROFILE_READ, SESSION_REFRESH, USER_READ, "patient.read"],
    ),
];

struct DemoActor {
    username: &'static str,
    email: Option<&'static str>,
    phone: Option<&'static str>,
    role_label: &'static str,
    active: bool,
    roles: &'static [&'static str],
}

const ACTORS: [DemoActor; 6] = [
    DemoActor {
        username: "superadmin",
        email: Some("superadmin@clinic.test"),
        phone: None,
        role_label: "SuperAdmin",
        active: true,
        roles: &["0"],
    },
    DemoActor {
        username: "admin",
        email: Some("admin@clinic.test"),
        phone: None,
        role_label: "Admin",
        active: true,
        roles: &["1"],
    },
    DemoActor {
        username: DOCTOR_USERNAME,
        email: Some("house@clinic.test"),
        phone: Some(DOCTOR_PHONE),
        role_label: "Doctor",
        active: true,
        roles: &["doctor"],
    },
    DemoActor {
        username: "front.desk",
        email: Some("desk@clinic.test"),
        phone: Some("+15550111"),
        role_label: "Receptionist",
        active: true,
        roles: &["reception"],
    },
    DemoActor {
        username: "newcomer",
        email: None,
        phone: None,
        role_label: "",
        active: true,
        roles: &[],
    },
    DemoActor {
        username: "former.staff",
        email: Some("former@clinic.test"),
        phone: None,
        role_label: "Doctor",
        active: false,
        roles: &["doctor"],
    },
];

/// Insert the demo data set unless actors already exist.
///
/// Phone numbers are stored through the field cipher.
pub async fn run(db: &DatabaseConnection, cipher: &FieldCipher, password: &str) -> Result<()> {
    if actors::Entity::find().count(db).await? > 0 {
        info!("actors already present; skipping seed");
        return Ok(());
    }

    let txn = db.begin().await?;
    let mut permission_ids = Vec::with_capacity(PERMISSIONS.len());
    for (code, description, active) in PERMISSIONS {
        let id = Uuid::new_v4();
        permissions::ActiveModel {
            id: Set(id),
            code: Set(code.into()),
            description: Set(Some(description.into())),
            is_active: Set(active),
        }
        .insert(&txn)
        .await?;
        permission_ids.push((code, id));
    }

    let mut role_ids = Vec::with_capacity(ROLES.len());
    for (code, name, grants) in ROLES {
        let role_id = Uuid::new_v4();
        roles::ActiveModel {
            id: Set(role_id),
            code: Set(code.into()),
            name: Set(name.into()),
        }
        .insert(&txn)
        .await?;
        for grant in grants {
            let permission_id = lookup(&permission_ids, grant)?;
            role_permissions::ActiveModel {
                role_id: Set(role_id),
                permission_id: Set(permission_id),
            }
            .insert(&txn)
            .await?;
        }
        role_ids.push((code, role_id));
    }

    let password_hash = hash_password(password)?;
    for actor in &ACTORS {
        insert_actor(&txn, cipher, actor, &password_hash, &role_ids).await?;
    }
    txn.commit().await?;

    info!(
        actors = ACTORS.len(),
        roles = ROLES.len(),
        permissions = PERMISSIONS.len(),
        "demo data seeded"
    );
    Ok(())
}

async fn insert_actor(
    txn: &DatabaseTransaction,
    cipher: &FieldCipher,
    actor: &DemoActor,
    password_hash: &str,
    role_ids: &[(&str, Uuid)],
) -> Result<()> {
    let actor_id = Uuid::new_v4();
    actors::ActiveModel {
        id: Set(actor_id),
        username: Set(actor.username.into()),
        email: Set(actor.email.map(Into::into)),
        phone: Set(actor.phone.map(|phone| cipher.encrypt(phone))),
        password_hash: Set(password_hash.into()),
        role_label: Set(actor.role_label.into()),
        is_active: Set(actor.active),
        created_at: Set(Utc::now().into()),
    }
    .insert(txn)
    .await?;
    for code in actor.roles {
        role_assignments::ActiveModel {
            actor_id: Set(actor_id),
            role_id: Set(lookup(role_ids, code)?),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

fn lookup(ids: &[(&str, Uuid)], code: &str) -> Result<Uuid> {
    ids.iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, id)| *id)
        .with_context(|| format!("seed references unknown code {code}"))
}
