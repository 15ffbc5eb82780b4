use tracing::warn;

use onq_core::Variant;
use onq_xml::roxmltree::{Document, Node};
use onq_xml::{evaluate, namespace_map_for, NamespaceMap, NoExtFunctions, Value};

/// The fixed completeness taxonomy. Weights sum to 100 and are front-loaded
/// toward fields with documented sales-discoverability impact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Isbn,
    Title,
    Contributors,
    Description,
    SubjectCodes,
    ProductForm,
    Price,
    PublicationDate,
    Publisher,
    Imprint,
    Series,
    CoverImage,
}

/// Presence gate applied to the first selected value.
enum Gate {
    /// Trimmed length of at least N characters.
    MinChars(usize),
    /// Parses as a number greater than zero.
    Positive,
}

struct FieldSpec {
    key: &'static str,
    weight: u32,
    /// Unqualified and namespace-qualified selectors, relative to a product.
    plain: &'static str,
    qualified: &'static str,
    /// Secondary selector tried when the primary yields nothing.
    plain_alt: Option<&'static str>,
    qualified_alt: Option<&'static str>,
    gate: Gate,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Isbn,
        Field::Title,
        Field::Contributors,
        Field::Description,
        Field::SubjectCodes,
        Field::ProductForm,
        Field::Price,
        Field::PublicationDate,
        Field::Publisher,
        Field::Imprint,
        Field::Series,
        Field::CoverImage,
    ];

    fn spec(self) -> &'static FieldSpec {
        match self {
            Field::Isbn => &FieldSpec {
                key: "isbn",
                weight: 20,
                plain: ".//ProductIdentifier[ProductIDType='15']/IDValue",
                qualified: ".//onix:ProductIdentifier[onix:ProductIDType='15']/onix:IDValue",
                plain_alt: Some(".//ProductIdentifier[ProductIDType='03']/IDValue"),
                qualified_alt: Some(
                    ".//onix:ProductIdentifier[onix:ProductIDType='03']/onix:IDValue",
                ),
                gate: Gate::MinChars(10),
            },
            Field::Title => &FieldSpec {
                key: "title",
                weight: 15,
                plain: ".//TitleDetail/TitleElement/TitleText",
                qualified: ".//onix:TitleDetail/onix:TitleElement/onix:TitleText",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(4),
            },
            Field::Contributors => &FieldSpec {
                key: "contributors",
                weight: 12,
                plain: ".//Contributor/PersonName",
                qualified: ".//onix:Contributor/onix:PersonName",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(4),
            },
            Field::Description => &FieldSpec {
                key: "description",
                weight: 10,
                plain: ".//TextContent[TextType='03']/Text",
                qualified: ".//onix:TextContent[onix:TextType='03']/onix:Text",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(51),
            },
            Field::SubjectCodes => &FieldSpec {
                key: "subject_codes",
                weight: 8,
                plain: ".//Subject/SubjectCode",
                qualified: ".//onix:Subject/onix:SubjectCode",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(1),
            },
            Field::ProductForm => &FieldSpec {
                key: "product_form",
                weight: 8,
                plain: ".//ProductForm",
                qualified: ".//onix:ProductForm",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(1),
            },
            Field::Price => &FieldSpec {
                key: "price",
                weight: 7,
                plain: ".//Price/PriceAmount",
                qualified: ".//onix:Price/onix:PriceAmount",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::Positive,
            },
            Field::PublicationDate => &FieldSpec {
                key: "publication_date",
                weight: 5,
                plain: ".//PublishingDate/Date",
                qualified: ".//onix:PublishingDate/onix:Date",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(8),
            },
            Field::Publisher => &FieldSpec {
                key: "publisher",
                weight: 5,
                plain: ".//Publisher/PublisherName",
                qualified: ".//onix:Publisher/onix:PublisherName",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(1),
            },
            Field::Imprint => &FieldSpec {
                key: "imprint",
                weight: 4,
                plain: ".//Imprint/ImprintName",
                qualified: ".//onix:Imprint/onix:ImprintName",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(1),
            },
            Field::Series => &FieldSpec {
                key: "series",
                weight: 3,
                plain: ".//Collection/TitleDetail/TitleElement/TitleText",
                qualified: ".//onix:Collection/onix:TitleDetail/onix:TitleElement/onix:TitleText",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(1),
            },
            Field::CoverImage => &FieldSpec {
                key: "cover_image",
                weight: 3,
                plain: ".//SupportingResource[ResourceContentType='01']/ResourceVersion/ResourceLink",
                qualified: ".//onix:SupportingResource[onix:ResourceContentType='01']/onix:ResourceVersion/onix:ResourceLink",
                plain_alt: None,
                qualified_alt: None,
                gate: Gate::MinChars(11),
            },
        }
    }

    pub fn key(self) -> &'static str {
        self.spec().key
    }

    pub fn weight(self) -> u32 {
        self.spec().weight
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Binary presence/quality gate for one product node. An evaluation
    /// error counts as absent rather than propagating.
    pub fn present(self, product: Node, variant: Variant) -> bool {
        let spec = self.spec();
        let qualified = variant.is_recognized_standard();
        let nsmap = namespace_map_for(variant);
        let primary = if qualified { spec.qualified } else { spec.plain };
        let alt = if qualified { spec.qualified_alt } else { spec.plain_alt };

        let mut value = first_value(primary, product, &nsmap);
        if value.as_deref().map_or(true, |v| v.is_empty()) {
            if let Some(alt) = alt {
                value = first_value(alt, product, &nsmap);
            }
        }
        let Some(value) = value else { return false };
        match spec.gate {
            Gate::MinChars(n) => value.chars().count() >= n,
            Gate::Positive => value.parse::<f64>().map_or(false, |v| v > 0.0),
        }
    }

    /// The raw value the presence gate inspects, when any.
    pub fn value(self, product: Node, variant: Variant) -> Option<String> {
        let spec = self.spec();
        let nsmap = namespace_map_for(variant);
        let expr = if variant.is_recognized_standard() { spec.qualified } else { spec.plain };
        first_value(expr, product, &nsmap).filter(|v| !v.is_empty())
    }
}

fn first_value(expr: &str, ctx: Node, nsmap: &NamespaceMap) -> Option<String> {
    match evaluate(expr, ctx, nsmap, &NoExtFunctions) {
        Ok(Value::Nodes(nodes)) => {
            nodes.first().map(|n| onq_xml::node_string(*n).trim().to_string())
        }
        Ok(other) => Some(other.string_value().trim().to_string()),
        Err(err) => {
            warn!(%expr, %err, "field selector failed");
            None
        }
    }
}

/// Product nodes of a message, qualified per the detected variant.
pub fn product_nodes<'a, 'i>(doc: &'a Document<'i>, variant: Variant) -> Vec<Node<'a, 'i>> {
    let nsmap = namespace_map_for(variant);
    let expr = if variant.is_recognized_standard() { "//onix:Product" } else { "//Product" };
    match evaluate(expr, doc.root_element(), &nsmap, &NoExtFunctions) {
        Ok(Value::Nodes(nodes)) => nodes,
        _ => Vec::new(),
    }
}
