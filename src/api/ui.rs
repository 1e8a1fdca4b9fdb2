//! 网页表单

use crate::controller::{ControllerSource, DistilledGate};

/// 页面标题
pub const TITLE: &str = "VQA — Memory + RL Controller";

/// 页面说明
pub const DESCRIPTION: &str =
    "Upload an image, enter a question, and the controller will choose the best decoding strategy.";

const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{TITLE}}</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 2rem; color: #222; }
  .row { display: flex; gap: 2rem; flex-wrap: wrap; }
  .col { flex: 1; min-width: 320px; }
  label.block { display: block; font-weight: 600; margin: 1rem 0 0.4rem; }
  textarea, output { width: 100%; box-sizing: border-box; }
  #preview { max-height: 320px; max-width: 100%; display: none; margin-top: 0.5rem; }
  output { display: block; min-height: 1.5rem; padding: 0.4rem; background: #f4f4f5; border-radius: 4px; white-space: pre-wrap; }
  button { margin-top: 1rem; padding: 0.5rem 1.5rem; background: #f97316; color: #fff; border: 0; border-radius: 4px; font-size: 1rem; }
  button:disabled { opacity: 0.6; }
</style>
</head>
<body>
<h3>{{TITLE}}</h3>
<p>{{DESCRIPTION}}</p>
<div class="row">
  <form class="col" id="vqa-form">
    <label class="block" for="image">Image</label>
    <input type="file" id="image" name="image" accept="image/*">
    <img id="preview" alt="">
    <label class="block" for="question">Question</label>
    <textarea id="question" name="question" rows="2" placeholder="e.g., What colour is the bus?"></textarea>
    <label class="block">Controller Source</label>
    {{SOURCE_OPTIONS}}
    <label class="block">Distilled Gate (if used)</label>
    {{DISTILLED_OPTIONS}}
    <div><button type="submit" id="run">Predict</button></div>
  </form>
  <div class="col">
    <label class="block">Answer</label>
    <output id="answer"></output>
    <label class="block">Chosen Strategy</label>
    <output id="strategy"></output>
    <label class="block">Latency (ms)</label>
    <output id="latency"></output>
  </div>
</div>
<script>
  const form = document.getElementById("vqa-form");
  const button = document.getElementById("run");
  const preview = document.getElementById("preview");
  document.getElementById("image").addEventListener("change", (e) => {
    const file = e.target.files[0];
    if (file) {
      preview.src = URL.createObjectURL(file);
      preview.style.display = "block";
    } else {
      preview.style.display = "none";
    }
  });
  form.addEventListener("submit", async (e) => {
    e.preventDefault();
    button.disabled = true;
    try {
      const resp = await fetch("/predict", { method: "POST", body: new FormData(form) });
      if (!resp.ok) {
        document.getElementById("answer").textContent = "Error: " + (await resp.text());
        document.getElementById("strategy").textContent = "error";
        document.getElementById("latency").textContent = "";
        return;
      }
      const out = await resp.json();
      document.getElementById("answer").textContent = out.answer;
      document.getElementById("strategy").textContent = out.strategy;
      document.getElementById("latency").textContent = out.latency_ms.toFixed(1);
    } finally {
      button.disabled = false;
    }
  });
</script>
</body>
</html>
"#;

fn radio_group(name: &str, values: &[&str]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            format!(
                r#"<label><input type="radio" name="{name}" value="{value}"{checked}> {value}</label>"#,
                checked = if i == 0 { " checked" } else { "" },
            )
        })
        .collect::<Vec<_>>()
        .join("\n    ")
}

/// 渲染页面；第一个选项（`auto`）为默认值
pub fn render() -> String {
    let sources: Vec<_> = ControllerSource::ALL.iter().map(|s| s.as_str()).collect();
    let gates: Vec<_> = DistilledGate::ALL.iter().map(|g| g.as_str()).collect();

    PAGE.replace("{{TITLE}}", TITLE)
        .replace("{{DESCRIPTION}}", DESCRIPTION)
        .replace("{{SOURCE_OPTIONS}}", &radio_group("source", &sources))
        .replace("{{DISTILLED_OPTIONS}}", &radio_group("distilled_model", &gates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_fixed_choices() {
        let page = render();
        assert!(page.contains(TITLE));
        assert!(page.contains(r#"<input type="radio" name="source" value="auto" checked>"#));
        assert!(page.contains(r#"value="baseline">"#));
        assert!(page.contains(r#"<input type="radio" name="distilled_model" value="auto" checked>"#));
        assert!(page.contains(r#"value="mlp32">"#));
        assert!(!page.contains("{{"));
    }
}
