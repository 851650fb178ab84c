use crate::describe::DescriptionSlug;
use crate::ladder::{ContainerFormat, IMAGE_DIR, IMAGE_LADDER};

/// Escapes text for use inside a double- or single-quoted attribute.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn asset_url(base_url: &str, file_name: &str) -> String {
    format!("{base_url}{IMAGE_DIR}/{file_name}")
}

/// `srcset` value listing every image rung of `format`, widest first.
pub fn srcset(base_url: &str, slug: &DescriptionSlug, format: ContainerFormat) -> String {
    IMAGE_LADDER
        .iter()
        .filter(|spec| spec.format == format)
        .map(|spec| {
            format!(
                "{} {}w",
                asset_url(base_url, &spec.file_name(slug)),
                spec.dimension
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// The narrowest JPEG rung, for browsers without `<picture>` support.
pub fn fallback_src(base_url: &str, slug: &DescriptionSlug) -> String {
    let narrowest = IMAGE_LADDER
        .iter()
        .filter(|spec| spec.format == ContainerFormat::Jpeg)
        .min_by_key(|spec| spec.dimension);
    match narrowest {
        Some(spec) => asset_url(base_url, &spec.file_name(slug)),
        None => String::new(),
    }
}

pub fn render_image_page(base_url: &str, slug: &DescriptionSlug, alt_text: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <style>
        body {{ margin: 0; background: #111; display: flex; justify-content: center; }}
        img {{ max-width: 100%; height: auto; }}
    </style>
</head>
<body>
    <picture>
        <source type="image/webp" srcset="{webp}" sizes="100vw" />
        <source type="image/jpeg" srcset="{jpeg}" sizes="100vw" />
        <img src="{fallback}" alt="{alt}" loading="lazy" />
    </picture>
</body>
</html>
"#,
        title = escape_html(slug.as_str()),
        webp = escape_html(&srcset(base_url, slug, ContainerFormat::Webp)),
        jpeg = escape_html(&srcset(base_url, slug, ContainerFormat::Jpeg)),
        fallback = escape_html(&fallback_src(base_url, slug)),
        alt = escape_html(alt_text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug(text: &str) -> DescriptionSlug {
        DescriptionSlug::from_text(text, 60).unwrap()
    }

    #[test]
    fn escapes_attribute_metacharacters() {
        assert_eq!(
            escape_html(r#"Tom & Jerry's "<chase>""#),
            "Tom &amp; Jerry&apos;s &quot;&lt;chase&gt;&quot;"
        );
    }

    #[test]
    fn srcset_lists_widths_per_format() {
        let slug = slug("red kite");
        assert_eq!(
            srcset("../", &slug, ContainerFormat::Webp),
            "../images/red-kite-1920w.webp 1920w, ../images/red-kite-1280w.webp 1280w, ../images/red-kite-640w.webp 640w"
        );
        assert_eq!(
            fallback_src("https://cdn.example/media/", &slug),
            "https://cdn.example/media/images/red-kite-640w.jpg"
        );
    }

    #[test]
    fn page_embeds_escaped_alt_text() {
        let page = render_image_page("../", &slug("red kite"), "A kite <over> the \"hill\"");
        assert!(page.contains(r#"alt="A kite &lt;over&gt; the &quot;hill&quot;""#));
        assert!(page.contains(r#"<img src="../images/red-kite-640w.jpg""#));
        assert!(page.contains("<title>red-kite</title>"));
        assert!(page.contains("../images/red-kite-1280w.jpg 1280w"));
    }
}
