//! End-to-end invariants: order preservation through parse/encode cycles,
//! attribute shape, root cardinality, canonical determinism, force-array,
//! type-inference idempotence, and legacy charset round-trips.

#![allow(clippy::unwrap_used)]

use xmlmap::{
    canonicalize, marshal, marshal_with_options, parse_str, parse_with_options, Error, Options,
    OrderedMap, Value,
};

/// Parses, re-encodes, and asserts byte equality. Valid for documents
/// without mixed content, comments, or self-closing tags.
fn assert_roundtrip(xml: &str) {
    let tree = parse_str(xml).unwrap();
    let out = marshal(&tree).unwrap();
    assert_eq!(out, xml, "document did not round-trip byte-equal");
}

#[test]
fn test_element_and_attribute_order_roundtrip() {
    assert_roundtrip(r#"<library><book id="1">The Little Prince</book></library>"#);
    assert_roundtrip(r#"<t zulu="26" alpha="1" mike="13">x</t>"#);
    assert_roundtrip(
        "<Root><Zebra>Animal</Zebra><Apple>Fruit</Apple><Carrot>Vegetable</Carrot></Root>",
    );
    assert_roundtrip(
        r#"<order no="77"><customer vip="yes" region="south">ACME</customer><total>9.5</total></order>"#,
    );
}

#[test]
fn test_repeated_elements_keep_document_order() {
    assert_roundtrip("<l><i>3</i><i>1</i><i>2</i></l>");
    let tree = parse_str("<l><b>B1</b><a>A</a><b>B2</b></l>").unwrap();
    // b was promoted to a sequence; document order of keys is b, a.
    let l = tree.get_node("l").unwrap();
    let children: Vec<String> = l
        .keys()
        .into_iter()
        .filter(|k| !k.starts_with('#'))
        .collect();
    assert_eq!(children, vec!["b", "a"]);
}

#[test]
fn test_attribute_keys_are_always_scalar() {
    fn walk(value: &Value) {
        if let Value::Map(map) = value {
            map.for_each(|key, v| {
                if key.starts_with('@') {
                    assert!(
                        v.is_scalar(),
                        "attribute {key} mapped to a non-scalar {v:?}"
                    );
                }
                walk(v);
                true
            });
        }
        if let Value::List(items) = value {
            for item in items {
                walk(item);
            }
        }
    }
    let tree = parse_str(
        r#"<svg width="100" height="100"><g fill="red"><circle cx="5" cy="5" r="4"/></g></svg>"#,
    )
    .unwrap();
    walk(&Value::Map(tree));
}

#[test]
fn test_single_root_enforced_at_encode() {
    let mut zero = OrderedMap::new();
    zero.put("#comments", Value::List(vec![Value::from("only metadata")]));
    assert!(matches!(marshal(&zero), Err(Error::RootCardinality(0))));

    let mut two = OrderedMap::new();
    two.put("a", "1");
    two.put("b", "2");
    assert!(matches!(marshal(&two), Err(Error::RootCardinality(2))));
}

#[test]
fn test_canonical_determinism_and_sorting() {
    let tree = parse_str(r#"<t zulu="1" alpha="2"><b>x</b><a>y</a></t>"#).unwrap();
    let c1 = canonicalize(&tree);
    let c2 = canonicalize(&tree.clone());
    assert_eq!(c1, c2);
    let text = String::from_utf8(c1).unwrap();
    // Attributes sort lexicographically; children keep document order.
    assert_eq!(text, r#"<t alpha="2" zulu="1"><b>x</b><a>y</a></t>"#);
}

#[test]
fn test_force_array_all_occurrence_counts() {
    let opts = Options::default().force_array(["book"]);

    let one = parse_with_options("<lib><book>One</book></lib>".as_bytes(), &opts).unwrap();
    // A single occurrence is still a singleton sequence, and list()
    // exposes the simplified scalar as a #text-carrying element.
    assert!(matches!(
        one.get_path("lib/book"),
        Some(Value::List(items)) if items.len() == 1
    ));
    let books = one.list("lib/book");
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].string("#text"), "One");

    let two = parse_with_options("<lib><book>A</book><book>B</book></lib>".as_bytes(), &opts)
        .unwrap();
    assert!(matches!(
        two.get_path("lib/book"),
        Some(Value::List(items)) if items.len() == 2
    ));
}

#[test]
fn test_force_array_list_of_maps() {
    let opts = Options::default().force_array(["book"]);
    let tree = parse_with_options(
        r#"<lib><book isbn="i1">One</book></lib>"#.as_bytes(),
        &opts,
    )
    .unwrap();
    let books = tree.list("lib/book");
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].string("#text"), "One");
    assert_eq!(books[0].string("@isbn"), "i1");
}

#[test]
fn test_type_inference_idempotent() {
    let opts = Options::default().experimental(true);
    let xml = "<r><i>42</i><f>2.5</f><t>true</t><s>7seven</s></r>";
    let first = parse_with_options(xml.as_bytes(), &opts).unwrap();
    let encoded = marshal(&first).unwrap();
    let second = parse_with_options(encoded.as_bytes(), &opts).unwrap();

    for path in ["r/i", "r/f", "r/t", "r/s"] {
        assert_eq!(first.get_path(path), second.get_path(path), "path {path}");
    }
    assert_eq!(first.get_path("r/i"), Some(&Value::Int(42)));
    assert_eq!(first.get_path("r/f"), Some(&Value::Float(2.5)));
    assert_eq!(first.get_path("r/t"), Some(&Value::Bool(true)));
}

#[test]
fn test_legacy_charset_scenario() {
    // ISO-8859-1 declared, byte 0xE9 is e-acute.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>");
    bytes.extend_from_slice(b"<data>caf\xE9</data>");
    let opts = Options::default().legacy_charsets(true);
    let tree = parse_with_options(bytes.as_slice(), &opts).unwrap();
    assert_eq!(tree.query("data").unwrap(), Value::String("café".to_string()));
}

#[test]
fn test_windows_1252_c1_range_roundtrip() {
    // Bytes in 0x80-0x9F decode through the Windows-1252 superset even
    // under an ISO-8859-1 declaration, and encode back as UTF-8.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"iso-8859-1\"?>");
    bytes.extend_from_slice(b"<q>\x93smart\x94 \x80</q>");
    let opts = Options::default().legacy_charsets(true);
    let tree = parse_with_options(bytes.as_slice(), &opts).unwrap();
    assert_eq!(
        tree.string("q"),
        "\u{201C}smart\u{201D} \u{20AC}"
    );
    let out = marshal(&tree).unwrap();
    assert_eq!(out, "<q>\u{201C}smart\u{201D} \u{20AC}</q>");
}

#[test]
fn test_unsupported_charset_is_fatal() {
    let bytes = b"<?xml version=\"1.0\" encoding=\"KOI8-R\"?><r>x</r>";
    let opts = Options::default().legacy_charsets(true);
    let err = parse_with_options(bytes.as_slice(), &opts).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCharset(name) if name == "koi8-r"));
}

#[test]
fn test_fluent_build_and_marshal_scenario() {
    // Fluent path assignment, compact and pretty forms.
    let mut m = OrderedMap::new();
    m.set_path("Order/Customer/@id", "C55");
    m.set_path("Order/Customer/Name", "Alice");
    m.set_path("Order/ID", "1001");

    assert_eq!(
        marshal(&m).unwrap(),
        "<Order><Customer id=\"C55\"><Name>Alice</Name></Customer><ID>1001</ID></Order>"
    );

    let pretty = marshal_with_options(&m, &Options::default().pretty(true)).unwrap();
    assert_eq!(
        pretty,
        "<Order>\n  <Customer id=\"C55\">\n    <Name>Alice</Name>\n  </Customer>\n  <ID>1001</ID>\n</Order>"
    );
}

#[test]
fn test_query_totality_on_missing_paths() {
    let tree = parse_str("<a><b>x</b></a>").unwrap();
    for path in ["nope", "a/nope", "a/b/c/d", "//missing", "a/*/deep", "a/b[0]"] {
        let results = tree.query_all(path).unwrap();
        assert!(results.is_empty(), "path {path} should match nothing");
    }
}

#[test]
fn test_cdata_marker_roundtrip() {
    let mut tree = OrderedMap::new();
    tree.set_path("script/#cdata", "if (a < b) { run(); }");
    let xml = marshal(&tree).unwrap();
    assert_eq!(xml, "<script><![CDATA[if (a < b) { run(); }]]></script>");
    // Parsing folds the CDATA back into character data.
    let back = parse_str(&xml).unwrap();
    assert_eq!(back.string("script"), "if (a < b) { run(); }");
}

#[test]
fn test_comments_preserved_in_model() {
    let tree = parse_str("<r><!-- first --><a>x</a><!-- second --></r>").unwrap();
    let r = tree.get_node("r").unwrap();
    let comments = r.get("#comments").unwrap().as_list().unwrap();
    assert_eq!(comments.len(), 2);
    let out = marshal(&tree).unwrap();
    assert!(out.contains("<!-- first -->"));
    assert!(out.contains("<!-- second -->"));
}

#[test]
fn test_directive_and_pi_captured_not_reemitted() {
    let tree = parse_str(
        "<?xml version=\"1.0\"?><!DOCTYPE catalog><catalog><item>x</item></catalog>",
    )
    .unwrap();
    let directives = tree.get_path("#directive").unwrap().as_list().unwrap();
    assert_eq!(directives[0], Value::String("DOCTYPE catalog".to_string()));
    let pis = tree.get_path("#pi").unwrap().as_list().unwrap();
    assert!(matches!(&pis[0], Value::String(s) if s.starts_with("target=xml")));
    // Neither reappears in encoder output.
    assert_eq!(marshal(&tree).unwrap(), "<catalog><item>x</item></catalog>");
}

#[test]
fn test_mutation_then_encode() {
    let tree = parse_str("<cfg><db><host>old</host></db></cfg>").unwrap();
    let mut tree = tree;
    tree.set_path("cfg/db/host", "new.example.com");
    tree.set_path("cfg/db/port", "5432");
    tree.move_path("cfg/db/port", "cfg/port").unwrap();
    assert_eq!(
        marshal(&tree).unwrap(),
        "<cfg><db><host>new.example.com</host></db><port>5432</port></cfg>"
    );
}
