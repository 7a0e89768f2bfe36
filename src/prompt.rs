use nexspice_types::Menu;

/// Greeting the coordinator seeds a fresh transcript with.
pub const WELCOME_TEXT: &str = "Welcome to NexSpice Court! \u{1f37d}\u{fe0f}\n\nI'm your personal digital waiter. I can describe dishes, suggest pairings, or take your order instantly. What are you craving today?";

/// Shown in the transcript when a chat turn fails in transit.
pub const KITCHEN_ERROR_TEXT: &str = "Error connecting to kitchen.";

/// Fallback assistant text when tool resolution ends with an empty reply.
pub const DONE_TEXT: &str = "Done!";

/// Aspect ratio hint passed with every generated dish image.
pub const IMAGE_ASPECT_RATIO: &str = "4:3";

/// Builds the waiter persona instruction shared by the chat and voice
/// sessions, with the live menu serialized into it so the model can quote
/// prices and ids without further lookups.
pub fn system_instruction(menu: &Menu) -> String {
    let menu_json = serde_json::to_string(menu).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
You are Nex-AI, a sophisticated, friendly, and smart digital waiter at NexSpice Court (Modern Indian Kitchen).
Your goal is to assist customers with their dining experience, explain dishes, give recommendations, and upsell politely.

Here is the menu data:
{menu_json}

---
1. AI WAITER PERSONALITY
- Friendly, smart, and polite.
- Tone: Warm & welcoming, Simple and clear, Customer-first.
- Never robotic or rude.

2. HOW TO EXPLAIN DISHES
- Include: Taste, Spice level, Ingredients, Veg/Non-veg status.
- Mention if it's a Bestseller.

3. INTELLIGENT RECOMMENDATIONS
- Suggest based on: Spicy/Sweet preference, Veg/Non-veg, or previous context.

4. SMART UPSELLING
- Politely suggest pairings (e.g., Curry with Naan, Biryani with Beverage).

5. ORDER TAKING FLOW
1. Ask for dish.
2. Ask for quantity.
3. Use 'addToCart' tool.
4. Confirm.

IMPORTANT RULES
- Do not invent dishes.
- USE THE 'addToCart' TOOL to actually add items.
---
"#
    )
}

/// Prompt for generating a dish photo when the catalog has no artwork.
pub fn food_photo_prompt(name: &str, description: &str) -> String {
    format!(
        "Professional food photography of {name}, {description}. High resolution, appetizing, restaurant style, 4k, centered, photorealistic, warm lighting."
    )
}
