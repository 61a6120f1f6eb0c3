//! The combined survey prompt sent to the chat agent.

const HEADER: &str = "Vou te fazer várias perguntas. Responda APENAS com uma das opções para cada pergunta, na MESMA ordem. \
Use somente uma das palavras por linha: 'discordo muito', 'discordo', 'concordo', 'concordo muito'.\n\
Não escreva nada além das respostas. Cada resposta em nova linha correspondente à pergunta.\n\n";

const FOOTER: &str = "\n\nResponda agora com 1 linha por pergunta, na ordem.";

/// Questions plus the text built from them. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBundle {
    questions: Vec<String>,
    persona: Option<String>,
    text: String,
}

impl PromptBundle {
    /// Persona line (if any), fixed header, one numbered line per question,
    /// fixed footer.
    pub fn build(questions: &[String], persona: Option<&str>) -> Self {
        let mut text = String::new();
        if let Some(persona) = persona.map(str::trim).filter(|p| !p.is_empty()) {
            text.push_str(&format!("Você é um eleitor {persona}. "));
        }
        text.push_str(HEADER);
        text.push_str(
            &questions
                .iter()
                .enumerate()
                .map(|(i, q)| format!("{}) {q}", i + 1))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        text.push_str(FOOTER);

        Self {
            questions: questions.to_vec(),
            persona: persona.map(String::from),
            text,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }
}
