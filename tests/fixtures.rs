//! Canonical ten-document fixture, ported from `original_source`'s
//! `tests/storage/document_store/test_all.py`: two partitions (`pk00`/ids
//! `0..4`, `pk01`/ids `5..9`) carrying every field shape the predicate and
//! update evaluators exercise (`const`, `opt`, `empty`, nested `obj.*`,
//! `arrstr`, `arrint`, `arrobj[].*`).
//!
//! Included as a module by the integration tests that need it (`mod
//! fixtures;`); cargo also builds this file as its own (empty) test
//! binary, which is why every item here is `pub` and `#[allow(dead_code)]`
//! guards the ones a given test binary doesn't reach.

#![allow(dead_code)]

use std::collections::HashMap;

use serde_json::json;

use portadb::ql::ParamBinding;
use portadb::value::Value;

fn word(i: u32) -> &'static str {
    match i {
        0 => "zero",
        1 => "one",
        2 => "two",
        3 => "three",
        4 => "four",
        5 => "five",
        6 => "six",
        7 => "seven",
        8 => "eight",
        9 => "nine",
        _ => unreachable!("fixture only spans ids 0..=9"),
    }
}

/// The ten canonical documents. Document `id="9"` (`pk="pk01"`) is the
/// sole document matching [`COMPLEX_CONDITION_1`] /
/// [`COMPLEX_CONDITION_1_WITH_PARAMS`]: every other document is excluded
/// by the partition clause, the `str in (...)` enum, or `obj.nint not in
/// (...)`.
pub fn canonical_documents() -> Vec<Value> {
    (0..10u32)
        .map(|i| {
            let pk = if i < 5 { "pk00" } else { "pk01" };
            let w = word(i);
            let mut doc = json!({
                "pk": pk,
                "id": i.to_string(),
                "str": w,
                "int": i,
                "float": i as f64,
                "bool": i % 2 == 0,
                "const": "k",
                "empty": null,
                "obj": {
                    "nstr": i.to_string(),
                    "nint": -(i as i64),
                    "nfloat": -(i as f64) - 0.5,
                    "nbool": i % 2 == 1,
                    "narr": [0, 1, 2, 3, 4, 5, 6, 7],
                    "nobj": {
                        "nnstr": "xy",
                        "nnint": i as i64,
                        "nnfloat": -900.1 - i as f64,
                    },
                },
                "arrstr": [format!("{} hundred", w), format!("hundred {}", w)],
                "arrint": [i, i * 10, 900 + i],
                "arrobj": [
                    {"ostr": format!("{} hundred", w), "oint": i as i64},
                    {"ostr": format!("hundred {}", w), "oint": i as i64 * 1_000_000_000},
                ],
            });
            // `opt` absent on odd ids; the sole match (id=9) needs it absent.
            if i % 2 == 0 {
                doc["opt"] = json!(format!("opt-{}", w));
            }
            doc.into()
        })
        .collect()
}

/// `WHERE` clause matched by exactly one canonical document (`id="9"`,
/// `pk="pk01"`), ported verbatim (field and function vocabulary) from
/// `complex_condition_1` in `original_source`.
pub const COMPLEX_CONDITION_1: &str = r#"length(arrstr[0]) > 7
    and contains(arrstr[1], 'und')
    and not contains(const, '$')
    and starts_with(arrobj[0].ostr, 'nine')
    and 8 = array_length(obj.narr)
    and array_contains(arrint, 909)
    and array_contains_any(arrstr, ['xyz', 'hundred nine', 'abc'])
    and is_defined(str)
    and is_not_defined(opt)
    and is_type(float, 'number')
    and is_type(obj.nobj, 'object')
    and is_type(empty, 'null')
    and not is_type(bool, 'array')
    and obj.nstr = "9"
    and arrobj[1].oint = 9000000000
    and 9.1 != float
    and int >= 8 and (bool = true or obj.nobj.nnfloat <= -900.1)
    and not (pk = "pk00" or length(obj.nobj.nnstr) != 2)
    and obj.nint between -10 and 10
    and str in ('one', 'two', 'eight', 'nine')
    and obj.nint not in (-1, -2, -8)"#;

/// Parameterized equivalent of [`COMPLEX_CONDITION_1`], `@p1..@p28`,
/// ported verbatim from `complex_condition_1_with_params`.
pub const COMPLEX_CONDITION_1_WITH_PARAMS: &str = r#"length(arrstr[0]) > @p1
    and contains(arrstr[1], @p2)
    and not contains(const, @p3)
    and starts_with(arrobj[0].ostr, @p4)
    and @p5 = array_length(obj.narr)
    and array_contains(arrint, @p6)
    and array_contains_any(arrstr, @p7)
    and is_defined(str)
    and is_not_defined(opt)
    and is_type(float, @p8)
    and is_type(obj.nobj, @p9)
    and is_type(empty, @p10)
    and not is_type(bool, @p11)
    and obj.nstr = @p12
    and arrobj[1].oint = @p13
    and @p14 != float
    and int >= @p15 and (bool = @p16 or obj.nobj.nnfloat <= @p17)
    and not (pk = @p18 or length(obj.nobj.nnstr) != @p19)
    and obj.nint between @p20 and @p21
    and str in (@p22, @p23, @p24, @p25)
    and obj.nint not in (@p26, @p27, @p28)"#;

/// Parameter map binding [`COMPLEX_CONDITION_1_WITH_PARAMS`] to the same
/// literals as [`COMPLEX_CONDITION_1`], ported from
/// `complex_condition_1_params`.
pub fn complex_condition_1_params() -> HashMap<String, ParamBinding> {
    fn v(value: Value) -> ParamBinding {
        ParamBinding::Value(value)
    }
    let mut p = HashMap::new();
    p.insert("p1".to_string(), v(Value::Int(7)));
    p.insert("p2".to_string(), v(Value::String("und".to_string())));
    p.insert("p3".to_string(), v(Value::String("$".to_string())));
    p.insert("p4".to_string(), v(Value::String("nine".to_string())));
    p.insert("p5".to_string(), v(Value::Int(8)));
    p.insert("p6".to_string(), v(Value::Int(909)));
    p.insert(
        "p7".to_string(),
        v(Value::Array(vec![
            Value::String("xyz".to_string()),
            Value::String("hundred nine".to_string()),
            Value::String("abc".to_string()),
        ])),
    );
    p.insert("p8".to_string(), v(Value::String("number".to_string())));
    p.insert("p9".to_string(), v(Value::String("object".to_string())));
    p.insert("p10".to_string(), v(Value::String("null".to_string())));
    p.insert("p11".to_string(), v(Value::String("array".to_string())));
    p.insert("p12".to_string(), v(Value::String("9".to_string())));
    p.insert("p13".to_string(), v(Value::Int(9_000_000_000)));
    p.insert("p14".to_string(), v(Value::Float(9.1)));
    p.insert("p15".to_string(), v(Value::Int(8)));
    p.insert("p16".to_string(), v(Value::Bool(true)));
    p.insert("p17".to_string(), v(Value::Float(-900.1)));
    p.insert("p18".to_string(), v(Value::String("pk00".to_string())));
    p.insert("p19".to_string(), v(Value::Int(2)));
    p.insert("p20".to_string(), v(Value::Int(-10)));
    p.insert("p21".to_string(), v(Value::Int(10)));
    p.insert("p22".to_string(), v(Value::String("one".to_string())));
    p.insert("p23".to_string(), v(Value::String("two".to_string())));
    p.insert("p24".to_string(), v(Value::String("eight".to_string())));
    p.insert("p25".to_string(), v(Value::String("nine".to_string())));
    p.insert("p26".to_string(), v(Value::Int(-1)));
    p.insert("p27".to_string(), v(Value::Int(-2)));
    p.insert("p28".to_string(), v(Value::Int(-8)));
    p
}
