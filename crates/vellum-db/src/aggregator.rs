use std::collections::HashMap;

use vellum_query::{AggKind, Value};

use crate::error::Result;
use crate::namespace::NamespaceCore;
use crate::payload::RowId;
use crate::planner::PlannedAgg;

/// One computed aggregation. `value` carries SUM/AVG/MIN/MAX; `facets`
/// carries FACET buckets (order unspecified unless the caller sorts).
#[derive(Debug, Clone)]
pub struct AggResult {
    pub field: String,
    pub kind: AggKind,
    pub value: f64,
    pub count: u64,
    pub facets: Vec<(Value, u64)>,
}

/// Fold rows through every requested aggregation in one pass.
///
/// SUM over integers accumulates in a widened i64, saturating silently;
/// once a double shows up the sum follows IEEE. AVG over zero rows is 0
/// with count 0, never NaN. Array fields contribute one sample per
/// element; absent fields contribute nothing.
pub(crate) fn aggregate(
    core: &NamespaceCore,
    rows: &[RowId],
    specs: &[PlannedAgg],
) -> Result<Vec<AggResult>> {
    let mut accums: Vec<Accum> = specs.iter().map(|_| Accum::default()).collect();

    for &row_id in rows {
        let Some(payload) = core.rows().get(&row_id) else {
            continue;
        };
        for (spec, accum) in specs.iter().zip(&mut accums) {
            for value in payload.scalars(spec.pos) {
                accum.push(spec.kind, value);
            }
        }
    }

    Ok(specs
        .iter()
        .zip(accums)
        .map(|(spec, accum)| accum.finish(spec))
        .collect())
}

#[derive(Default)]
struct Accum {
    int_sum: i64,
    float_sum: f64,
    saw_float: bool,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
    facets: HashMap<Value, u64>,
}

impl Accum {
    fn push(&mut self, kind: AggKind, value: &Value) {
        if kind == AggKind::Facet {
            *self.facets.entry(value.clone()).or_insert(0) += 1;
            return;
        }

        // Numeric aggregations skip non-numeric samples.
        let Some(v) = value.as_f64() else { return };
        self.count += 1;

        match value {
            Value::Int32(i) => self.int_sum = self.int_sum.saturating_add(*i as i64),
            Value::Int64(i) => self.int_sum = self.int_sum.saturating_add(*i),
            _ => {
                self.saw_float = true;
                self.float_sum += v;
            }
        }

        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    fn finish(self, spec: &PlannedAgg) -> AggResult {
        let sum = if self.saw_float {
            self.int_sum as f64 + self.float_sum
        } else {
            self.int_sum as f64
        };
        let value = match spec.kind {
            AggKind::Sum => sum,
            AggKind::Avg => {
                if self.count == 0 {
                    0.0
                } else {
                    sum / self.count as f64
                }
            }
            AggKind::Min => self.min.unwrap_or(0.0),
            AggKind::Max => self.max.unwrap_or(0.0),
            AggKind::Facet => 0.0,
        };
        let count = match spec.kind {
            AggKind::Facet => self.facets.values().sum(),
            _ => self.count,
        };
        AggResult {
            field: spec.field.clone(),
            kind: spec.kind,
            value,
            count,
            facets: self.facets.into_iter().collect(),
        }
    }
}
