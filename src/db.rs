use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::class::{CharacterClass, MlLine, Realm};
use crate::item::{Inventory, InventoryItem};
use crate::player::{ActiveBuff, Player, Position};

#[derive(Debug, Clone)]
pub struct AccountData {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// A saved character row. Backpack, spell lines and buffs are JSON.
#[derive(Debug, Clone)]
pub struct CharacterData {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub class_id: i64,
    pub realm: String,
    pub race: String,
    pub level: i64,
    pub priv_level: i64,
    pub region: i64,
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub heading: i64,
    pub money: i64,
    pub bounty_points: i64,
    pub ml_line: i64,
    pub ml_level: i64,
    pub ml_granted: bool,
    pub ml_experience: i64,
    pub inventory_json: String,
    pub spell_lines_json: String,
    pub buffs_json: String,
}

impl CharacterData {
    /// Rebuild the in-game player. Corrupt JSON columns load as empty.
    pub fn into_player(self, player_id: &str) -> Result<Player, String> {
        let class = u8::try_from(self.class_id)
            .ok()
            .and_then(CharacterClass::from_id)
            .ok_or_else(|| format!("Character {} has unknown class {}", self.id, self.class_id))?;
        let realm = Realm::from_name(&self.realm)
            .ok_or_else(|| format!("Character {} has unknown realm '{}'", self.id, self.realm))?;

        let slots: Vec<Option<InventoryItem>> = serde_json::from_str(&self.inventory_json).unwrap_or_else(|e| {
            tracing::warn!("Character {} has unreadable inventory: {}", self.id, e);
            Vec::new()
        });
        let spell_lines: Vec<String> = serde_json::from_str(&self.spell_lines_json).unwrap_or_default();
        let buffs: Vec<ActiveBuff> = serde_json::from_str(&self.buffs_json).unwrap_or_default();

        let level = u8::try_from(self.level).unwrap_or(1);
        let mut player = Player::new(player_id, &self.name, class, &self.race, level);
        player.character_id = self.id;
        player.realm = realm;
        player.priv_level = u8::try_from(self.priv_level).unwrap_or(1);
        player.position = Position::new(
            u16::try_from(self.region).unwrap_or(0),
            self.x as i32,
            self.y as i32,
            self.z as i32,
            u16::try_from(self.heading).unwrap_or(0),
        );
        player.inventory = Inventory::from_slots(slots);
        player.money = self.money;
        player.bounty_points = self.bounty_points;
        player.ml_line = MlLine::from_u8(u8::try_from(self.ml_line).unwrap_or(0));
        player.ml_level = u8::try_from(self.ml_level).unwrap_or(0);
        player.ml_granted = self.ml_granted;
        player.ml_experience = self.ml_experience;
        player.spell_lines = spell_lines;
        player.buffs = buffs;
        Ok(player)
    }

    fn from_row(r: &SqliteRow) -> Self {
        Self {
            id: r.get("id"),
            account_id: r.get("account_id"),
            name: r.get("name"),
            class_id: r.get("class_id"),
            realm: r.get("realm"),
            race: r.get("race"),
            level: r.get("level"),
            priv_level: r.get("priv_level"),
            region: r.get("region"),
            x: r.get("x"),
            y: r.get("y"),
            z: r.get("z"),
            heading: r.get("heading"),
            money: r.get("money"),
            bounty_points: r.get("bounty_points"),
            ml_line: r.get("ml_line"),
            ml_level: r.get("ml_level"),
            ml_granted: r.get("ml_granted"),
            ml_experience: r.get("ml_experience"),
            inventory_json: r.get("inventory_json"),
            spell_lines_json: r.get("spell_lines_json"),
            buffs_json: r.get("buffs_json"),
        }
    }
}

const CHARACTER_COLUMNS: &str = "id, account_id, name, class_id, realm, race, level, priv_level, \
     region, x, y, z, heading, money, bounty_points, ml_line, ml_level, ml_granted, ml_experience, \
     inventory_json, spell_lines_json, buffs_json";

/// What a player picks when creating a character
#[derive(Debug, Clone)]
pub struct NewCharacter<'a> {
    pub name: &'a str,
    pub class: CharacterClass,
    pub race: &'a str,
    pub level: u8,
    pub start: Position,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                last_login DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                name TEXT UNIQUE NOT NULL,
                class_id INTEGER NOT NULL,
                realm TEXT NOT NULL,
                race TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1,
                priv_level INTEGER NOT NULL DEFAULT 1,
                region INTEGER NOT NULL DEFAULT 0,
                x INTEGER NOT NULL DEFAULT 0,
                y INTEGER NOT NULL DEFAULT 0,
                z INTEGER NOT NULL DEFAULT 0,
                heading INTEGER NOT NULL DEFAULT 0,
                money INTEGER NOT NULL DEFAULT 0,
                bounty_points INTEGER NOT NULL DEFAULT 0,
                ml_line INTEGER NOT NULL DEFAULT 0,
                ml_level INTEGER NOT NULL DEFAULT 0,
                ml_granted BOOLEAN NOT NULL DEFAULT 0,
                ml_experience INTEGER NOT NULL DEFAULT 0,
                inventory_json TEXT NOT NULL DEFAULT '[]',
                spell_lines_json TEXT NOT NULL DEFAULT '[]',
                buffs_json TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                last_played DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(account_id) REFERENCES accounts(id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Create a new account with hashed password
    pub async fn create_account(&self, username: &str, password: &str) -> Result<i64, String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| format!("Failed to hash password: {}", e))?
            .to_string();

        let result = sqlx::query("INSERT INTO accounts (username, password_hash) VALUES (?, ?)")
            .bind(username)
            .bind(&password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint failed") {
                    "Username already exists".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            })?;

        tracing::info!("Created account: {} (id: {})", username, result.last_insert_rowid());
        Ok(result.last_insert_rowid())
    }

    pub async fn get_account_by_username(&self, username: &str) -> Result<Option<AccountData>, sqlx::Error> {
        let row = sqlx::query("SELECT id, username, password_hash FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| AccountData {
            id: r.get("id"),
            username: r.get("username"),
            password_hash: r.get("password_hash"),
        }))
    }

    /// Verify password and return the account if valid
    pub async fn verify_account_password(&self, username: &str, password: &str) -> Option<AccountData> {
        let account = self.get_account_by_username(username).await.ok()??;
        let parsed_hash = PasswordHash::new(&account.password_hash).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .ok()?;

        let _ = sqlx::query("UPDATE accounts SET last_login = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(account.id)
            .execute(&self.pool)
            .await;
        Some(account)
    }

    // ========================================================================
    // Characters
    // ========================================================================

    pub async fn create_character(&self, account_id: i64, new: &NewCharacter<'_>) -> Result<CharacterData, String> {
        let result = sqlx::query(
            r#"INSERT INTO characters
                (account_id, name, class_id, realm, race, level, region, x, y, z, heading)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(account_id)
        .bind(new.name)
        .bind(i64::from(new.class.id()))
        .bind(new.class.realm().as_str())
        .bind(new.race)
        .bind(i64::from(new.level))
        .bind(i64::from(new.start.region))
        .bind(i64::from(new.start.x))
        .bind(i64::from(new.start.y))
        .bind(i64::from(new.start.z))
        .bind(i64::from(new.start.heading))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint failed") {
                "Character name already exists".to_string()
            } else {
                format!("Database error: {}", e)
            }
        })?;

        self.get_character(result.last_insert_rowid())
            .await
            .map_err(|e| format!("Database error: {}", e))?
            .ok_or_else(|| "Character vanished after insert".to_string())
    }

    pub async fn get_character(&self, character_id: i64) -> Result<Option<CharacterData>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM characters WHERE id = ?", CHARACTER_COLUMNS))
            .bind(character_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(CharacterData::from_row))
    }

    pub async fn get_characters_for_account(&self, account_id: i64) -> Result<Vec<CharacterData>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM characters WHERE account_id = ? ORDER BY id",
            CHARACTER_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(CharacterData::from_row).collect())
    }

    pub async fn count_characters_for_account(&self, account_id: i64) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM characters WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Delete a character owned by the account. Returns false when no row matched.
    pub async fn delete_character(&self, character_id: i64, account_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM characters WHERE id = ? AND account_id = ?")
            .bind(character_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist everything about a player except session-only temp properties
    pub async fn save_character(&self, player: &Player) -> Result<(), sqlx::Error> {
        let inventory_json = serde_json::to_string(&player.inventory.slots).unwrap_or_else(|_| "[]".to_string());
        let spell_lines_json = serde_json::to_string(&player.spell_lines).unwrap_or_else(|_| "[]".to_string());
        let buffs_json = serde_json::to_string(&player.buffs).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"UPDATE characters SET
                level = ?, priv_level = ?, region = ?, x = ?, y = ?, z = ?, heading = ?,
                money = ?, bounty_points = ?, ml_line = ?, ml_level = ?, ml_granted = ?,
                ml_experience = ?, inventory_json = ?, spell_lines_json = ?, buffs_json = ?,
                last_played = CURRENT_TIMESTAMP
            WHERE id = ?"#,
        )
        .bind(i64::from(player.level))
        .bind(i64::from(player.priv_level))
        .bind(i64::from(player.position.region))
        .bind(i64::from(player.position.x))
        .bind(i64::from(player.position.y))
        .bind(i64::from(player.position.z))
        .bind(i64::from(player.position.heading))
        .bind(player.money)
        .bind(player.bounty_points)
        .bind(i64::from(player.ml_line as u8))
        .bind(i64::from(player.ml_level))
        .bind(player.ml_granted)
        .bind(player.ml_experience)
        .bind(inventory_json)
        .bind(spell_lines_json)
        .bind(buffs_json)
        .bind(player.character_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
