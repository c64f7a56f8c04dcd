//! The stalk market: price derivation and corn sales at a visited garden.

use chrono::NaiveDate;
use gardenbot::garden::{
    sell_crops, stalk_price, GardenStore, GardenStoreBuilder, ItemKind, ItemStack,
};
use tempfile::TempDir;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn seed_garden(store: &GardenStore, guild: &str, user: &str) {
    store
        .insert_stacks(vec![
            ItemStack::draft(guild, user, ItemKind::House, 3, 3, 1),
            ItemStack::draft(guild, user, ItemKind::Coins, 0, 0, 0),
            ItemStack::draft(guild, user, ItemKind::Water, 0, 0, 0),
        ])
        .expect("seed");
}

#[test]
fn prices_stay_on_the_ladder() {
    let today = date("2025-01-15");
    for user in 0..500u32 {
        let price = stalk_price(&user.to_string(), today);
        assert!(
            [1, 2, 4, 8, 16, 32, 64].contains(&price),
            "user {} priced off-ladder at {}",
            user,
            price
        );
    }
}

#[test]
fn low_prices_dominate_the_distribution() {
    let today = date("2025-01-15");
    let cheap = (0..1000u32)
        .filter(|u| stalk_price(&u.to_string(), today) <= 2)
        .count();
    // The ladder allocates 175 of 256 byte values to prices 1 and 2.
    assert!(
        cheap > 500,
        "only {} of 1000 users priced at 1 or 2",
        cheap
    );
}

#[test]
fn price_is_per_user_and_per_day() {
    let a = "11111111";
    let day1 = date("2025-03-01");

    assert_eq!(stalk_price(a, day1), stalk_price(a, day1));

    let mut day_varies = false;
    for day in 2..=28 {
        if stalk_price(a, date(&format!("2025-03-{:02}", day))) != stalk_price(a, day1) {
            day_varies = true;
            break;
        }
    }
    assert!(day_varies, "price never changed across a month");

    let mut user_varies = false;
    for user in 0..200u32 {
        if stalk_price(&user.to_string(), day1) != stalk_price(a, day1) {
            user_varies = true;
            break;
        }
    }
    assert!(user_varies, "every user priced identically");
}

#[test]
fn corn_sells_at_the_host_garden_price() {
    let dir = TempDir::new().expect("tempdir");
    let store = GardenStoreBuilder::new(dir.path()).open().expect("store");
    seed_garden(&store, "g", "visitor");

    // Find a host whose price today beats the flat rate, so selling at
    // their garden is visibly different from selling at home.
    let today = date("2025-05-20");
    let host = (0..500u32)
        .map(|u| u.to_string())
        .find(|u| stalk_price(u, today) >= 8)
        .expect("some pricey host");
    let host_price = stalk_price(&host, today);

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            store
                .insert_stacks(vec![ItemStack::draft("g", "visitor", ItemKind::Corn, 0, 0, 1)])
                .expect("insert")
                .remove(0)
                .id,
        );
    }

    let sale = sell_crops(&store, "g", "visitor", &ids, &host, today).expect("sell");
    assert_eq!(sale.units_sold, 3);
    assert_eq!(sale.coins_credited, 3 * host_price);

    let stacks = store.list_stacks("g", "visitor").expect("list");
    let coins = stacks
        .iter()
        .find(|s| s.kind == ItemKind::Coins)
        .expect("coins");
    assert_eq!(coins.quantity, 3 * host_price);
    assert!(
        !stacks.iter().any(|s| s.kind == ItemKind::Corn && s.is_stored()),
        "exactly the sold rows are gone"
    );
}
