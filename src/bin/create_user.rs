//! Seeds an account from the command line, the only way accounts are
//! created: `create_user <username> <password> [admin|reviewer|user]`.

use anyhow::{bail, Context};
use diesel::prelude::*;
use uuid::Uuid;

use docflow::auth::password::hash_password;
use docflow::config::AppConfig;
use docflow::db;
use docflow::models::{NewUser, Role};
use docflow::schema::users;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (username, password, role) = match args.as_slice() {
        [username, password] => (username.clone(), password.clone(), Role::User),
        [username, password, role] => {
            let role = Role::parse(role)
                .with_context(|| format!("unknown role '{role}' (expected admin, reviewer or user)"))?;
            (username.clone(), password.clone(), role)
        }
        _ => bail!("usage: create_user <username> <password> [admin|reviewer|user]"),
    };

    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get()?;

    let user = NewUser {
        id: Uuid::new_v4(),
        username: username.clone(),
        password_hash: hash_password(&password)?,
        role,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create user '{username}'"))?;

    println!("created {} user '{username}' ({})", role, user.id);
    Ok(())
}
