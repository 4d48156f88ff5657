//! Browser-facing analyzer with an event outbox drained from JavaScript.

use kurve_core::analysis::{AnalysisRecord, Analyzer, ExpressionInput};
use kurve_core::config::ScanConfig;
use kurve_core::delivery::{DeliveryQueue, DeliverySettings, Dispatch, QueueStatus};
use kurve_core::equation_engine::{evaluate, CompiledExpression};
use kurve_core::events::{AnalysisEvent, EventSink, LogSink};
use kurve_core::normalize::normalize;
use kurve_core::plot::{sample_curve, CurveSamples, Viewport};
use serde::de::DeserializeOwned;
use serde_wasm_bindgen::{from_value, to_value};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

/// Sends every event to the console logger and the outbox.
#[derive(Clone)]
pub(crate) struct BridgeSink {
    outbox: Rc<RefCell<DeliveryQueue>>,
}

impl EventSink for BridgeSink {
    fn emit(&self, event: AnalysisEvent) {
        LogSink.emit(event.clone());
        self.outbox.emit(event);
    }
}

#[wasm_bindgen]
pub struct WasmAnalyzer {
    analyzer: Analyzer<BridgeSink>,
    outbox: Rc<RefCell<DeliveryQueue>>,
}

fn optional_from_value<T: DeserializeOwned + Default>(value: JsValue, what: &str) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", what, e)))
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
impl WasmAnalyzer {
    /// Both arguments are optional partial objects; missing fields keep
    /// their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_val: JsValue, delivery_val: JsValue) -> Result<WasmAnalyzer, JsValue> {
        console_error_panic_hook::set_once();

        let config: ScanConfig = optional_from_value(config_val, "scan config")?;
        let delivery: DeliverySettings = optional_from_value(delivery_val, "delivery settings")?;
        Self::from_settings(config, delivery)
            .map_err(|e| JsValue::from_str(&format!("Invalid scan config: {}", e)))
    }

    pub fn normalize(&self, raw: &str) -> Result<JsValue, JsValue> {
        serialize(&normalize(raw))
    }

    /// `f(x)` for a canonical expression, `undefined` where it is not defined.
    pub fn evaluate(&self, canonical: &str, x: f64) -> Option<f64> {
        evaluate(canonical, x)
    }

    pub fn analyze(&self, text: &str, color: Option<String>) -> Result<JsValue, JsValue> {
        let record = self.analyze_text(text, color)?;
        serialize(&record)
    }

    /// `inputs_val` is an array of `{ text, color? }`.
    pub fn analyze_batch(&self, inputs_val: JsValue) -> Result<JsValue, JsValue> {
        let inputs: Vec<ExpressionInput> = from_value(inputs_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid expression list: {}", e)))?;
        let records = self
            .analyzer
            .analyze_batch(&inputs)
            .map_err(|e| JsValue::from_str(&format!("Analysis error: {}", e)))?;
        serialize(&records)
    }

    pub fn sample_curve(
        &self,
        text: &str,
        x_min: f64,
        x_max: f64,
        samples: u32,
    ) -> Result<JsValue, JsValue> {
        let viewport = Viewport {
            x_min,
            x_max,
            samples: samples as usize,
        };
        let curve = self.sample_text(text, &viewport)?;
        serialize(&curve)
    }

    /// Hands out up to `limit` events that are due for delivery.
    pub fn take_ready_events(&self, limit: u32) -> Result<JsValue, JsValue> {
        let batch = self.take_ready_at(js_sys::Date::now(), limit as usize);
        serialize(&batch)
    }

    /// Returns how many of the given ids were known.
    pub fn ack_events(&self, ids_val: JsValue) -> Result<u32, JsValue> {
        let ids: Vec<u64> = from_value(ids_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid event ids: {}", e)))?;
        Ok(self.ack(&ids))
    }

    pub fn nack_events(&self, ids_val: JsValue) -> Result<u32, JsValue> {
        let ids: Vec<u64> = from_value(ids_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid event ids: {}", e)))?;
        Ok(self.nack_at(&ids, js_sys::Date::now()))
    }

    pub fn pending_events(&self) -> Result<JsValue, JsValue> {
        serialize(&self.status())
    }
}

impl WasmAnalyzer {
    pub(crate) fn from_settings(
        config: ScanConfig,
        delivery: DeliverySettings,
    ) -> anyhow::Result<WasmAnalyzer> {
        config.validate()?;
        let outbox = Rc::new(RefCell::new(DeliveryQueue::new(delivery)));
        let sink = BridgeSink {
            outbox: Rc::clone(&outbox),
        };
        log::debug!("analyzer ready on [{}, {}]", config.x_min, config.x_max);
        Ok(WasmAnalyzer {
            analyzer: Analyzer::with_sink(config, sink),
            outbox,
        })
    }

    pub(crate) fn analyze_text(
        &self,
        text: &str,
        color: Option<String>,
    ) -> Result<AnalysisRecord, JsValue> {
        let input = ExpressionInput {
            text: text.to_string(),
            color,
        };
        self.analyzer
            .analyze(&input)
            .map_err(|e| JsValue::from_str(&format!("Analysis error: {}", e)))
    }

    pub(crate) fn sample_text(&self, text: &str, viewport: &Viewport) -> Result<CurveSamples, JsValue> {
        let normalized = normalize(text);
        if let Some(rejection) = normalized.rejection {
            return Err(JsValue::from_str(&format!("Invalid expression: {}", rejection)));
        }
        let compiled = CompiledExpression::compile(&normalized.canonical)
            .map_err(|e| JsValue::from_str(&format!("Invalid expression: {}", e)))?;
        sample_curve(&compiled, viewport)
            .map_err(|e| JsValue::from_str(&format!("Invalid viewport: {}", e)))
    }

    pub(crate) fn take_ready_at(&self, now_ms: f64, limit: usize) -> Vec<Dispatch> {
        self.outbox.borrow_mut().take_ready(now_ms, limit)
    }

    pub(crate) fn ack(&self, ids: &[u64]) -> u32 {
        let mut outbox = self.outbox.borrow_mut();
        ids.iter().filter(|&&id| outbox.ack(id)).count() as u32
    }

    pub(crate) fn nack_at(&self, ids: &[u64], now_ms: f64) -> u32 {
        let mut outbox = self.outbox.borrow_mut();
        ids.iter().filter(|&&id| outbox.nack(id, now_ms)).count() as u32
    }

    pub(crate) fn status(&self) -> QueueStatus {
        self.outbox.borrow().status()
    }
}
