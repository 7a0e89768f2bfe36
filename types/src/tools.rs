use serde_json::json;

/// A model-invokable capability, described to the backend as a JSON Schema
/// function declaration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDeclaration {
    /// The name of the function
    name: String,

    /// The description of the function
    description: String,

    /// The parameters of the function in JSON Schema format
    parameters: serde_json::Value,
}

impl FunctionDeclaration {
    pub fn new(name: String, description: String, parameters: serde_json::Value) -> Self {
        Self {
            name,
            description,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }
}

/// The name of the only capability the assistant exposes.
pub const ADD_TO_CART: &str = "addToCart";

/// Declaration for the cart-add tool, exactly as the backend expects it.
pub fn add_to_cart_declaration() -> FunctionDeclaration {
    FunctionDeclaration::new(
        ADD_TO_CART.to_string(),
        "Add an item to the cart.".to_string(),
        json!({
            "type": "OBJECT",
            "properties": {
                "dishId": { "type": "STRING" },
                "quantity": { "type": "NUMBER" }
            },
            "required": ["dishId", "quantity"]
        }),
    )
}

/// A request from the model to invoke a named capability. The correlation id
/// must be echoed back in the matching [`FunctionResponse`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The result echoed back for one function call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: serde_json::Value,
}

impl FunctionResponse {
    /// A success result answering `call`, e.g. `{"result": "Added 2 x Garlic Naan"}`.
    pub fn success(call: &FunctionCall, result: String) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "result": result }),
        }
    }

    /// A failure result answering `call`. Every call gets an answer, even
    /// ones naming capabilities we do not recognize, so the model's turn can
    /// always advance.
    pub fn failure(call: &FunctionCall, error: String) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "error": error }),
        }
    }
}
