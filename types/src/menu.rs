/// Menu section a dish is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Category {
    #[serde(rename = "Starters")]
    Starters,
    #[serde(rename = "Mains")]
    Mains,
    #[serde(rename = "Breads & Rice")]
    BreadsRice,
    #[serde(rename = "Beverages")]
    Beverages,
    #[serde(rename = "Desserts")]
    Desserts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Diet {
    #[serde(rename = "VEG")]
    Veg,
    #[serde(rename = "NON_VEG")]
    NonVeg,
}

/// Immutable catalog entry, created once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    /// Unique key the model refers to in cart-add tool calls.
    id: String,

    /// Display name; also the key of the generated-image cache.
    name: String,

    /// Price in whole currency units.
    price: u32,

    description: String,

    /// Artwork reference: an external URL, or empty when artwork is generated on demand.
    #[serde(default)]
    image: String,

    category: Category,

    diet: Diet,

    #[serde(default, skip_serializing_if = "is_false")]
    is_bestseller: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl Dish {
    pub fn new(id: &str, name: &str, price: u32, description: &str, category: Category, diet: Diet) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            price,
            description: description.to_string(),
            image: String::new(),
            category,
            diet,
            is_bestseller: false,
        }
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.image = image.to_string();
        self
    }

    pub fn with_bestseller(mut self, bestseller: bool) -> Self {
        self.is_bestseller = bestseller;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> u32 {
        self.price
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn diet(&self) -> Diet {
        self.diet
    }

    pub fn is_bestseller(&self) -> bool {
        self.is_bestseller
    }
}

/// One cart line: a dish plus how many units of it. Owned by the cart
/// collaborator; sessions only ever ask for single-unit additions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CartItem {
    dish: Dish,
    quantity: u32,
}

impl CartItem {
    pub fn new(dish: Dish) -> Self {
        Self { dish, quantity: 1 }
    }

    pub fn dish(&self) -> &Dish {
        &self.dish
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn increment(&mut self) {
        self.quantity = self.quantity.saturating_add(1);
    }
}

/// The restaurant's menu: the read-only dish catalog keyed by id.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Menu {
    dishes: Vec<Dish>,
}

impl Menu {
    pub fn new(dishes: Vec<Dish>) -> Self {
        Self { dishes }
    }

    /// The menu NexSpice Court ships with.
    pub fn standard() -> Self {
        Self::new(vec![
            Dish::new(
                "1",
                "Paneer Tandoori Tikka",
                299,
                "Cottage cheese cubes marinated in spiced yogurt and grilled to smoky perfection.",
                Category::Starters,
                Diet::Veg,
            )
            .with_bestseller(true),
            Dish::new(
                "5",
                "Butter Paneer Masala",
                349,
                "Rich and creamy tomato gravy with soft paneer cubes and butter.",
                Category::Mains,
                Diet::Veg,
            )
            .with_bestseller(true),
            Dish::new(
                "9",
                "Chicken Biryani (Hyd)",
                349,
                "Authentic Hyderabadi style spicy dum biryani with tender chicken.",
                Category::Mains,
                Diet::NonVeg,
            )
            .with_bestseller(true),
            Dish::new(
                "12",
                "Garlic Naan",
                85,
                "Classic naan topped with minced garlic and coriander.",
                Category::BreadsRice,
                Diet::Veg,
            ),
            Dish::new(
                "17",
                "Gulab Jamun",
                99,
                "Soft deep-fried milk solids soaked in sugar syrup.",
                Category::Desserts,
                Diet::Veg,
            ),
        ])
    }

    pub fn dishes(&self) -> &[Dish] {
        &self.dishes
    }

    pub fn dish_by_id(&self, id: &str) -> Option<&Dish> {
        self.dishes.iter().find(|dish| dish.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        let menu = Menu::standard();
        let naan = menu.dish_by_id("12").unwrap();
        assert_eq!(naan.name(), "Garlic Naan");
        assert_eq!(naan.price(), 85);
        assert_eq!(naan.diet(), Diet::Veg);

        assert!(menu.dish_by_id("999").is_none());
    }

    #[test]
    fn serializes_with_product_field_names() {
        let dish = Dish::new("9", "Chicken Biryani (Hyd)", 349, "Spicy dum biryani.", Category::Mains, Diet::NonVeg)
            .with_bestseller(true);
        let json = serde_json::to_value(&dish).unwrap();
        assert_eq!(json["category"], "Mains");
        assert_eq!(json["diet"], "NON_VEG");
        assert_eq!(json["isBestseller"], true);

        let plain = Dish::new("12", "Garlic Naan", 85, "Naan.", Category::BreadsRice, Diet::Veg);
        let json = serde_json::to_value(&plain).unwrap();
        assert_eq!(json["category"], "Breads & Rice");
        assert!(json.get("isBestseller").is_none());
    }

    #[test]
    fn cart_item_starts_at_one_unit() {
        let menu = Menu::standard();
        let mut item = CartItem::new(menu.dish_by_id("17").unwrap().clone());
        assert_eq!(item.quantity(), 1);
        item.increment();
        assert_eq!(item.quantity(), 2);
    }
}
