use crate::ir::{AttributeIR, ElementNode, ExpressionNode, TemplateIR, TemplateNode, TextNode};

/// The single traversal mechanism for the markup tree.
///
/// Order is pre-order and follows source order. Implementers override
/// `visit_*` and call the matching `walk_*` to keep descending; skipping the
/// walk prunes that subtree.
pub trait TemplateVisitor {
    fn visit_template(&mut self, template: &TemplateIR) {
        walk_template(self, template);
    }

    fn visit_children(&mut self, children: &[TemplateNode]) {
        walk_children(self, children);
    }

    fn visit_node(&mut self, node: &TemplateNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &ElementNode) {
        walk_element(self, element);
    }

    fn visit_attribute(&mut self, _attribute: &AttributeIR) {}

    fn visit_text(&mut self, _text: &TextNode) {}

    fn visit_expression(&mut self, _expression: &ExpressionNode) {}
}

pub fn walk_template<V: TemplateVisitor + ?Sized>(visitor: &mut V, template: &TemplateIR) {
    visitor.visit_children(&template.nodes);
}

pub fn walk_children<V: TemplateVisitor + ?Sized>(visitor: &mut V, children: &[TemplateNode]) {
    for node in children {
        visitor.visit_node(node);
    }
}

pub fn walk_node<V: TemplateVisitor + ?Sized>(visitor: &mut V, node: &TemplateNode) {
    match node {
        TemplateNode::Element(element) => visitor.visit_element(element),
        TemplateNode::Text(text) => visitor.visit_text(text),
        TemplateNode::Expression(expression) => visitor.visit_expression(expression),
    }
}

/// Visits attributes first, then children.
pub fn walk_element<V: TemplateVisitor + ?Sized>(visitor: &mut V, element: &ElementNode) {
    for attribute in &element.attributes {
        visitor.visit_attribute(attribute);
    }
    visitor.visit_children(&element.children);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttributeValue, ExpressionIR};

    #[derive(Default)]
    struct Trace(Vec<String>);

    impl TemplateVisitor for Trace {
        fn visit_element(&mut self, element: &ElementNode) {
            self.0.push(format!("<{}>", element.tag));
            walk_element(self, element);
            self.0.push(format!("</{}>", element.tag));
        }

        fn visit_attribute(&mut self, attribute: &AttributeIR) {
            self.0.push(format!("@{}", attribute.name));
        }

        fn visit_text(&mut self, text: &TextNode) {
            self.0.push(text.value.clone());
        }

        fn visit_expression(&mut self, expression: &ExpressionNode) {
            self.0.push(format!("{{{}}}", expression.expression.code));
        }
    }

    #[test]
    fn walks_in_source_order() {
        let template = TemplateIR {
            nodes: vec![TemplateNode::element(
                "p",
                vec![AttributeIR {
                    name: "class".into(),
                    value: AttributeValue::Static("x".into()),
                }],
                vec![
                    TemplateNode::text("a"),
                    TemplateNode::expression(ExpressionIR {
                        id: "expr_0".into(),
                        code: "b".into(),
                    }),
                ],
            )],
            expressions: Vec::new(),
        };

        let mut trace = Trace::default();
        trace.visit_template(&template);
        assert_eq!(trace.0, vec!["<p>", "@class", "a", "{b}", "</p>"]);
    }
}
