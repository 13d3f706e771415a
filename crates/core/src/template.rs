use crate::SourceLanguage;

/// 空白 HTML 來源使用的樣板。 / Boilerplate handed out when an empty markup source is opened.
pub const MARKUP_BOILERPLATE: &str = "<!DOCTYPE html>
<html lang=\"en\">
<head>
    <meta charset=\"UTF-8\">
    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">
    <title>Document</title>
</head>
<body>

</body>
</html>
";

/// Text shown by the widget while no tab is bound.
pub const PLACEHOLDER_TEXT: &str = "// Open a folder or a file...";

/// Returns the boilerplate for an empty source, if the language has one.
///
/// Only markup gets a template; non-empty sources are never touched.
pub fn boilerplate_for(language: SourceLanguage) -> Option<&'static str> {
    match language {
        SourceLanguage::Markup => Some(MARKUP_BOILERPLATE),
        _ => None,
    }
}

/// 新專案各語言的起始內容。 / Starter content for each slot of a freshly created project.
pub fn starter_template(language: SourceLanguage) -> &'static str {
    match language {
        SourceLanguage::Markup => "<h1>Hello, world!</h1>\n<p>Start editing to see the preview update.</p>\n",
        SourceLanguage::Stylesheet => "body {\n    font-family: sans-serif;\n    margin: 2rem;\n}\n",
        SourceLanguage::Script => "console.log(\"ready\");\n",
        SourceLanguage::Data => "{}\n",
        SourceLanguage::ServerScript => "<?php\necho \"Hello, world!\";\n",
        SourceLanguage::ScriptSecondary => "const greeting: string = \"Hello, world!\";\nconsole.log(greeting);\n",
        SourceLanguage::Plain => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boilerplate_only_for_markup() {
        assert!(boilerplate_for(SourceLanguage::Markup).is_some());
        assert!(boilerplate_for(SourceLanguage::Stylesheet).is_none());
        assert!(boilerplate_for(SourceLanguage::Plain).is_none());
    }
}
