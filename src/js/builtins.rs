//! Global names that never count as dependencies, and the subset that is safe to call

/// Names resolved by the host environment rather than the player script
const GLOBAL_NAMES: &[&str] = &[
    "AbortController",
    "Array",
    "ArrayBuffer",
    "BigInt",
    "Boolean",
    "DataView",
    "Date",
    "Error",
    "EvalError",
    "Float32Array",
    "Float64Array",
    "Function",
    "Infinity",
    "Int16Array",
    "Int32Array",
    "Int8Array",
    "Intl",
    "JSON",
    "Map",
    "Math",
    "NaN",
    "Number",
    "Object",
    "Promise",
    "Proxy",
    "RangeError",
    "ReferenceError",
    "Reflect",
    "RegExp",
    "Set",
    "String",
    "Symbol",
    "SyntaxError",
    "TextDecoder",
    "TextEncoder",
    "TypeError",
    "URIError",
    "URL",
    "URLSearchParams",
    "Uint16Array",
    "Uint32Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "WeakMap",
    "WeakSet",
    "arguments",
    "atob",
    "btoa",
    "clearInterval",
    "clearTimeout",
    "console",
    "decodeURI",
    "decodeURIComponent",
    "document",
    "encodeURI",
    "encodeURIComponent",
    "escape",
    "eval",
    "fetch",
    "globalThis",
    "hasOwnProperty",
    "isFinite",
    "isNaN",
    "location",
    "navigator",
    "parse",
    "parseFloat",
    "parseInt",
    "prototype",
    "self",
    "setInterval",
    "setTimeout",
    "split",
    "stringify",
    "this",
    "toString",
    "undefined",
    "unescape",
    "valueOf",
    "window",
];

/// Callables with no observable effect outside their arguments
const PURE_CALLEES: &[&str] = &[
    "Array",
    "BigInt",
    "Boolean",
    "Date",
    "Error",
    "Map",
    "Number",
    "Object",
    "RegExp",
    "Set",
    "String",
    "Symbol",
    "TypeError",
    "Uint8Array",
    "WeakMap",
    "WeakSet",
    "atob",
    "btoa",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
];

/// Method names that are safe to call in strict mode
const PURE_METHODS: &[&str] = &[
    "abs",
    "ceil",
    "charAt",
    "charCodeAt",
    "concat",
    "floor",
    "fromCharCode",
    "hasOwnProperty",
    "indexOf",
    "join",
    "keys",
    "max",
    "min",
    "parse",
    "pow",
    "prototype",
    "reverse",
    "round",
    "slice",
    "split",
    "stringify",
    "toLowerCase",
    "toString",
    "toUpperCase",
    "trim",
    "valueOf",
];

/// Check if `name` is provided by the host environment
pub fn is_global(name: &str) -> bool {
    GLOBAL_NAMES.contains(&name)
}

/// Check if calling the global `name` is side-effect free
pub fn is_pure_callee(name: &str) -> bool {
    PURE_CALLEES.contains(&name)
}

/// Check if calling a method called `name` is side-effect free
pub fn is_pure_method(name: &str) -> bool {
    PURE_METHODS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals() {
        assert!(is_global("Math"));
        assert!(is_global("decodeURIComponent"));
        assert!(!is_global("Yz"));
    }

    #[test]
    fn test_network_calls_are_not_pure() {
        assert!(is_global("fetch"));
        assert!(!is_pure_callee("fetch"));
        assert!(!is_pure_callee("setTimeout"));
        assert!(!is_pure_callee("eval"));
        assert!(is_pure_callee("parseInt"));
    }

    #[test]
    fn test_pure_methods() {
        assert!(is_pure_method("split"));
        assert!(!is_pure_method("call"));
        assert!(!is_pure_method("sendBeacon"));
    }
}
