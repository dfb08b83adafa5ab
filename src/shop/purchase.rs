//! Buying from a merchant catalog.
//!
//! Every check runs before anything changes; a failed purchase leaves the
//! player untouched.

use std::fmt;

use super::definition::{Currency, ShopDefinition};
use crate::data::ItemRegistry;
use crate::npc::{farewell, package_buffs};
use crate::player::{ActiveBuff, Player};
use crate::script::ScriptBook;

/// Largest quantity a single purchase may ask for
pub const MAX_PURCHASE_QUANTITY: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    InvalidQuantity,
    NotSold,
    OneAtATime(String),
    CannotAfford(String),
    InventoryFull,
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseError::InvalidQuantity => write!(f, "Invalid quantity."),
            PurchaseError::NotSold => write!(f, "That item is not sold here."),
            PurchaseError::OneAtATime(message) => write!(f, "{}", message),
            PurchaseError::CannotAfford(label) => write!(f, "You don't have enough {}.", label),
            PurchaseError::InventoryFull => write!(f, "You don't have enough room in your backpack."),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Purchase {
    pub item_id: String,
    pub name: String,
    pub quantity: i32,
    pub cost: i64,
    pub currency: Currency,
    /// Buffs cast by a buff package instead of adding it to the backpack
    pub buffs: Vec<ActiveBuff>,
    /// Said by the merchant after casting a package
    pub farewell: Option<String>,
}

impl Purchase {
    pub fn message(&self, items: &ItemRegistry) -> String {
        let price = self.currency.format(self.cost, items);
        if self.quantity > 1 {
            format!("You just bought {} {} for {}.", self.quantity, self.name, price)
        } else {
            format!("You just bought {} for {}.", self.name, price)
        }
    }
}

fn balance(player: &Player, currency: &Currency) -> i64 {
    match currency {
        Currency::Gold => player.money,
        Currency::BountyPoints => player.bounty_points,
        Currency::Item(id) => i64::from(player.inventory.count_of(id)),
    }
}

/// Buy `quantity` of an item from a catalog
pub fn purchase(
    player: &mut Player,
    shop: &ShopDefinition,
    items: &ItemRegistry,
    book: &ScriptBook,
    item_id: &str,
    quantity: i32,
    buff_expires_at: u64,
) -> Result<Purchase, PurchaseError> {
    if quantity <= 0 || quantity > MAX_PURCHASE_QUANTITY {
        return Err(PurchaseError::InvalidQuantity);
    }

    let stock = shop.get_stock(item_id).ok_or(PurchaseError::NotSold)?;
    let def = items.get(item_id).ok_or(PurchaseError::NotSold)?;

    let is_package = def.is_buff_package();
    if (is_package || shop.one_per_purchase) && quantity > 1 {
        return Err(PurchaseError::OneAtATime(book.buffs.messages.one_at_a_time.clone()));
    }

    let cost = stock.unit_price(def) * i64::from(quantity);
    if balance(player, &shop.currency) < cost {
        return Err(PurchaseError::CannotAfford(shop.currency.label(items)));
    }

    // Work on a copy so nothing changes unless everything fits
    let mut inventory = player.inventory.clone();
    if let Currency::Item(currency_id) = &shop.currency {
        let Ok(cost) = i32::try_from(cost) else {
            return Err(PurchaseError::CannotAfford(shop.currency.label(items)));
        };
        if !inventory.remove_count(currency_id, cost) {
            return Err(PurchaseError::CannotAfford(shop.currency.label(items)));
        }
    }

    let buffs = if is_package {
        package_buffs(book, player.class, item_id, buff_expires_at).ok_or_else(|| {
            tracing::warn!("Buff package '{}' has no token entry", item_id);
            PurchaseError::NotSold
        })?
    } else {
        let leftover = if def.is_stackable() {
            inventory.add_stack(&def.id, &def.display_name, quantity, def.max_stack)
        } else {
            let mut leftover = quantity;
            while leftover > 0 && inventory.add_to_first_empty(def.instantiate(1)).is_ok() {
                leftover -= 1;
            }
            leftover
        };
        if leftover > 0 {
            return Err(PurchaseError::InventoryFull);
        }
        Vec::new()
    };

    match &shop.currency {
        Currency::Gold => player.money -= cost,
        Currency::BountyPoints => player.bounty_points -= cost,
        Currency::Item(_) => {}
    }
    player.inventory = inventory;
    for buff in &buffs {
        player.apply_buff(buff.clone());
    }

    Ok(Purchase {
        item_id: item_id.to_string(),
        name: def.display_name.clone(),
        quantity,
        cost,
        currency: shop.currency.clone(),
        buffs,
        farewell: is_package.then(|| farewell(book, &player.race_name)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::CharacterClass;
    use crate::responder::tests::{player, Fixture};
    use crate::shop::ShopRegistry;
    use std::path::Path;

    fn shops() -> ShopRegistry {
        let mut registry = ShopRegistry::new();
        registry.load_from_directory(Path::new("data/shops")).unwrap();
        registry
    }

    #[test]
    fn test_buy_buff_package_for_gold_casts_immediately() {
        let fixture = Fixture::shipped();
        let shops = shops();
        let mut player = player(CharacterClass::Armsman);
        player.money = 500_000;

        let bought = purchase(
            &mut player,
            shops.get("BuffTokens").unwrap(),
            &fixture.items,
            &fixture.book,
            "Strength_Buff_Token",
            1,
            5_000,
        )
        .unwrap();

        assert_eq!(bought.cost, 20_000);
        assert_eq!(player.money, 480_000);
        assert!(!player.inventory.has("Strength_Buff_Token"));
        assert!(player.buffs.iter().any(|b| b.spell == "str"));
        assert!(bought.message(&fixture.items).ends_with("for 2g."));
        assert_eq!(bought.farewell.as_deref(), Some("Fight well, Briton."));
    }

    #[test]
    fn test_buff_packages_one_at_a_time() {
        let fixture = Fixture::shipped();
        let shops = shops();
        let mut player = player(CharacterClass::Armsman);
        player.bounty_points = 1_000;

        let err = purchase(
            &mut player,
            shops.get("BPBuffTokens").unwrap(),
            &fixture.items,
            &fixture.book,
            "BPHaste_Buff_Token",
            2,
            0,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "You can buy only one buff at a time !");
        assert_eq!(player.bounty_points, 1_000);
    }

    #[test]
    fn test_buy_with_bounty_points() {
        let fixture = Fixture::shipped();
        let shops = shops();
        let mut player = player(CharacterClass::Armsman);
        player.bounty_points = 15;

        let bought =
            purchase(&mut player, shops.get("ml_bounty").unwrap(), &fixture.items, &fixture.book, "ml1token", 1, 0)
                .unwrap();
        assert!(bought.farewell.is_none());
        assert_eq!(player.bounty_points, 5);
        assert!(player.inventory.has("ml1token"));

        let err = purchase(&mut player, shops.get("ml_bounty").unwrap(), &fixture.items, &fixture.book, "ml1token", 1, 0)
            .unwrap_err();
        assert_eq!(err, PurchaseError::CannotAfford("bounty points".to_string()));
    }

    #[test]
    fn test_buy_with_currency_item() {
        let fixture = Fixture::shipped();
        let shops = shops();
        let mut player = player(CharacterClass::Armsman);
        player.inventory.add_stack("atlanteanglass", "Atlantean Glass", 25, 1000);

        let bought = purchase(&mut player, shops.get("ml_glass").unwrap(), &fixture.items, &fixture.book, "ml2token", 1, 0)
            .unwrap();
        assert_eq!(player.inventory.count_of("atlanteanglass"), 5);
        assert!(player.inventory.has("ml2token"));
        assert_eq!(
            bought.message(&fixture.items),
            "You just bought Master Level 2 Token for 20 Atlantean Glass."
        );
    }

    #[test]
    fn test_full_backpack_changes_nothing() {
        let fixture = Fixture::shipped();
        let shops = shops();
        let mut player = player(CharacterClass::Armsman);
        player.bounty_points = 100;
        for _ in 0..crate::item::BACKPACK_SIZE {
            player.inventory.add_to_first_empty(crate::item::InventoryItem::new("filler", "Filler", 1)).unwrap();
        }

        let err = purchase(&mut player, shops.get("ml_bounty").unwrap(), &fixture.items, &fixture.book, "ml1token", 1, 0)
            .unwrap_err();
        assert_eq!(err, PurchaseError::InventoryFull);
        assert_eq!(player.bounty_points, 100);
    }

    #[test]
    fn test_rejects_bad_quantity_and_unknown_stock() {
        let fixture = Fixture::shipped();
        let shops = shops();
        let mut player = player(CharacterClass::Armsman);
        let shop = shops.get("ml_bounty").unwrap();

        assert_eq!(
            purchase(&mut player, shop, &fixture.items, &fixture.book, "ml1token", 0, 0).unwrap_err(),
            PurchaseError::InvalidQuantity
        );
        assert_eq!(
            purchase(&mut player, shop, &fixture.items, &fixture.book, "Full_Buffs_Token", 1, 0).unwrap_err(),
            PurchaseError::NotSold
        );
    }
}
