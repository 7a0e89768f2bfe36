use nexspice_types::menu::{Dish, Menu};
use nexspice_types::tools::{FunctionCall, FunctionResponse, ADD_TO_CART};

/// Upper bound on units added by a single tool call, so a bad quantity can
/// never spin the cart callback unbounded.
pub const MAX_UNITS_PER_CALL: u32 = 99;

/// Read-only dish lookup, the only catalog access the sessions perform.
#[cfg_attr(test, mockall::automock)]
pub trait Catalog: Send + Sync {
    fn dish_by_id(&self, id: &str) -> Option<Dish>;
}

impl Catalog for Menu {
    fn dish_by_id(&self, id: &str) -> Option<Dish> {
        Menu::dish_by_id(self, id).cloned()
    }
}

/// Cart mutation as the sessions see it: one unit per invocation, side
/// effect only. The cart itself is owned by the caller.
#[cfg_attr(test, mockall::automock)]
pub trait CartSink: Send + Sync {
    fn add_unit(&self, dish: &Dish);
}

/// Adapts a plain closure into a [`CartSink`], the shape UI callbacks
/// usually arrive in.
pub struct CartFn<F>(F);

impl<F> CartSink for CartFn<F>
where
    F: Fn(&Dish) + Send + Sync,
{
    fn add_unit(&self, dish: &Dish) {
        (self.0)(dish)
    }
}

pub fn cart_fn<F>(f: F) -> CartFn<F>
where
    F: Fn(&Dish) + Send + Sync,
{
    CartFn(f)
}

/// Strongly typed `addToCart` arguments, decoded from the model's raw
/// argument bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddToCartArgs {
    pub dish_id: String,
    pub quantity: u32,
}

impl AddToCartArgs {
    /// Decodes the argument bag, failing closed on shape mismatch. An
    /// absent or zero quantity means one unit; negative, fractional, or
    /// non-numeric quantities are rejected outright.
    pub fn decode(args: &serde_json::Value) -> Result<Self, String> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawArgs {
            dish_id: String,
            #[serde(default)]
            quantity: Option<serde_json::Number>,
        }

        let raw: RawArgs = serde_json::from_value(args.clone())
            .map_err(|e| format!("Malformed addToCart arguments: {e}"))?;

        let quantity = match raw.quantity {
            None => 1,
            Some(number) => {
                let units = number
                    .as_u64()
                    .or_else(|| {
                        number
                            .as_f64()
                            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                            .map(|f| f as u64)
                    })
                    .ok_or_else(|| {
                        format!("addToCart quantity must be a non-negative integer, got {number}")
                    })?;
                match units {
                    0 => 1,
                    n => n.min(MAX_UNITS_PER_CALL as u64) as u32,
                }
            }
        };

        Ok(Self {
            dish_id: raw.dish_id,
            quantity,
        })
    }
}

/// Resolves one model-issued function call against the catalog and cart.
/// Every call receives exactly one response echoing its correlation id, so
/// the model's turn can always advance: unknown tools, malformed arguments,
/// and unknown dish ids all answer with an explicit failure.
pub fn resolve_function_call(catalog: &dyn Catalog, cart: &dyn CartSink, call: &FunctionCall) -> FunctionResponse {
    if call.name != ADD_TO_CART {
        tracing::warn!(name = %call.name, "unrecognized tool call");
        return FunctionResponse::failure(call, format!("Unknown tool '{}'", call.name));
    }

    let args = match AddToCartArgs::decode(&call.args) {
        Ok(args) => args,
        Err(reason) => {
            tracing::warn!(%reason, "rejected addToCart arguments");
            return FunctionResponse::failure(call, reason);
        }
    };

    let Some(dish) = catalog.dish_by_id(&args.dish_id) else {
        tracing::warn!(dish_id = %args.dish_id, "tool call named a dish not on the menu");
        return FunctionResponse::failure(call, format!("No dish with id '{}'", args.dish_id));
    };

    for _ in 0..args.quantity {
        cart.add_unit(&dish);
    }
    tracing::info!(dish = %dish.name(), quantity = args.quantity, "added to cart");
    FunctionResponse::success(call, format!("Added {} x {}", args.quantity, dish.name()))
}

/// Resolves a batch in arrival order, one response per call.
pub fn resolve_function_calls(
    catalog: &dyn Catalog,
    cart: &dyn CartSink,
    calls: &[FunctionCall],
) -> Vec<FunctionResponse> {
    calls
        .iter()
        .map(|call| resolve_function_call(catalog, cart, call))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            id: Some("fc-1".to_string()),
            name: ADD_TO_CART.to_string(),
            args,
        }
    }

    #[test]
    fn quantity_n_invokes_cart_n_times() {
        let menu = Menu::standard();
        let mut cart = MockCartSink::new();
        cart.expect_add_unit()
            .withf(|dish| dish.name() == "Garlic Naan")
            .times(2)
            .returning(|_| ());

        let response = resolve_function_call(&menu, &cart, &call(json!({ "dishId": "12", "quantity": 2 })));
        assert_eq!(response.response["result"], "Added 2 x Garlic Naan");
    }

    #[test]
    fn unknown_dish_never_reaches_the_cart() {
        let menu = Menu::standard();
        let mut cart = MockCartSink::new();
        cart.expect_add_unit().times(0);

        let response = resolve_function_call(&menu, &cart, &call(json!({ "dishId": "999", "quantity": 1 })));
        assert_eq!(response.response["error"], "No dish with id '999'");
        assert_eq!(response.id.as_deref(), Some("fc-1"));
    }

    #[test]
    fn unrecognized_tool_gets_a_failure_response() {
        let menu = Menu::standard();
        let mut cart = MockCartSink::new();
        cart.expect_add_unit().times(0);

        let stray = FunctionCall {
            id: Some("fc-2".to_string()),
            name: "placeOrder".to_string(),
            args: json!({}),
        };
        let response = resolve_function_call(&menu, &cart, &stray);
        assert_eq!(response.id.as_deref(), Some("fc-2"));
        assert_eq!(response.response["error"], "Unknown tool 'placeOrder'");
    }

    #[test]
    fn malformed_arguments_fail_closed() {
        let menu = Menu::standard();
        let mut cart = MockCartSink::new();
        cart.expect_add_unit().times(0);

        for args in [
            json!({ "quantity": 2 }),
            json!({ "dishId": "12", "quantity": "two" }),
            json!({ "dishId": "12", "quantity": -1 }),
            json!({ "dishId": "12", "quantity": 1.5 }),
            json!(null),
        ] {
            let response = resolve_function_call(&menu, &cart, &call(args));
            assert!(response.response.get("error").is_some());
        }
    }

    #[test]
    fn quantity_defaults_and_coercions() {
        assert_eq!(AddToCartArgs::decode(&json!({ "dishId": "12" })).unwrap().quantity, 1);
        assert_eq!(AddToCartArgs::decode(&json!({ "dishId": "12", "quantity": 0 })).unwrap().quantity, 1);
        assert_eq!(AddToCartArgs::decode(&json!({ "dishId": "12", "quantity": 2.0 })).unwrap().quantity, 2);
        assert_eq!(
            AddToCartArgs::decode(&json!({ "dishId": "12", "quantity": 1000 })).unwrap().quantity,
            MAX_UNITS_PER_CALL
        );
    }

    #[test]
    fn closures_act_as_cart_sinks() {
        let menu = Menu::standard();
        let count = std::sync::atomic::AtomicU32::new(0);
        let sink = cart_fn(|_dish: &Dish| {
            count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        resolve_function_call(&menu, &sink, &call(json!({ "dishId": "17", "quantity": 3 })));
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
