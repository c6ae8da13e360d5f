use std::collections::HashMap;

use flintrock::core::template::render;
use proptest::prelude::*;

proptest! {
    /// With no matching bindings the renderer is a pure pass-through,
    /// whatever the input looks like.
    #[test]
    fn render_with_empty_bindings_is_identity(template in "\\PC*") {
        prop_assert_eq!(render(&template, &HashMap::new()), template);
    }

    #[test]
    fn render_substitutes_a_known_placeholder(
        key in "[a-z_]{1,12}",
        value in "[^{}]*",
    ) {
        let bindings = HashMap::from([(key.clone(), value.clone())]);
        let template = format!("pre {{{key}}} post");
        prop_assert_eq!(render(&template, &bindings), format!("pre {value} post"));
    }

    #[test]
    fn render_preserves_an_unknown_placeholder(key in "[a-z_]{1,12}") {
        let template = format!("head {{{key}}} tail");
        prop_assert_eq!(render(&template, &HashMap::new()), template);
    }

    #[test]
    fn render_never_touches_shell_expansions(var in "[A-Z_]{1,12}") {
        let template = format!("echo \"${{{var}}}\"");
        let bindings = HashMap::from([(var.clone(), "should not appear".to_string())]);
        prop_assert_eq!(render(&template, &bindings), template);
    }
}
