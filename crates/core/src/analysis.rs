use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::index::{RetrievedFragment, SessionState};
use crate::models::{ContractInfo, EventList, ExtractedEvent, ItemFailure};
use crate::traits::TextModel;

/// Fragments retrieved as context for one question.
pub const ANSWER_TOP_K: usize = 5;

/// Fixed line returned when anomaly detection finds nothing.
pub const NO_ANOMALIES: &str = "Nenhuma anomalia significativa foi detectada.";

const CONTRACT_INFO_FORMAT: &str = "Responda APENAS com um objeto JSON com as chaves: \
\"arquivo_fonte\" (string), \"nome_banco_emissor\" (string ou null), \
\"valor_principal_numerico\" (número ou null), \"prazo_total_meses\" (número inteiro ou null), \
\"taxa_juros_anual_numerica\" (número ou null), \"possui_clausula_rescisao_multa\" \
('Sim', 'Não' ou 'Não claro'), \"condicao_limite_credito\" (string ou null), \
\"condicao_juros_rotativo\" (string ou null), \"condicao_anuidade\" (string ou null), \
\"condicao_cancelamento\" (string ou null). Use null quando a informação não for encontrada.";

const EVENT_LIST_FORMAT: &str = "Responda APENAS com um objeto JSON com as chaves: \
\"eventos\" (lista de objetos com \"descricao_evento\" (string), \"data_evento_str\" \
(data no formato YYYY-MM-DD ou null) e \"trecho_relevante\" (string ou null)) e \
\"arquivo_fonte\" (string).";

const EXTRACTION_PROMPT: &str = "Analise o seguinte texto de contrato e extraia as informações \
solicitadas. Se uma informação não for encontrada, use o valor padrão definido no schema.\n\
Texto do Contrato: \"{texto_documento}\"\n\
Arquivo de Origem: \"{nome_arquivo}\"\n\
{format_instructions}";

const SUMMARY_PROMPT: &str = "Você é um assistente jurídico especializado em simplificar \
documentos complexos.\n\
Crie um resumo executivo claro e conciso (máximo de 5 parágrafos) do seguinte contrato.\n\
O resumo deve destacar:\n\
1. As partes envolvidas.\n\
2. O objeto principal do contrato.\n\
3. Os valores e condições de pagamento mais importantes.\n\
4. O prazo de vigência e condições de rescisão.\n\
5. Quaisquer obrigações ou responsabilidades críticas para o contratante.\n\
Responda em português do Brasil.\n\n\
Contrato (originado do arquivo {nome_arquivo}):\n---\n{texto_contrato}\n---\n\
Resumo Executivo:";

const RISK_PROMPT: &str = "Você é um advogado especialista em análise de risco contratual.\n\
Sua tarefa é ler o contrato abaixo, originado do arquivo '{nome_arquivo}', e identificar \
potenciais riscos, ambiguidades e cláusulas desfavoráveis para a parte contratante.\n\
Organize sua análise nos seguintes tópicos em formato Markdown:\n\n\
- **Riscos Financeiros:** (Ex: multas, juros altos, taxas escondidas, ausência de limites de \
responsabilidade)\n\
- **Riscos Operacionais e de Conformidade:** (Ex: obrigações de difícil cumprimento, prazos \
irreais, cláusulas de rescisão abrupta, leis aplicáveis desfavoráveis)\n\
- **Ambiguidade e Omissões:** (Ex: termos mal definidos, falta de especificações, ausência de \
cláusulas importantes como confidencialidade ou proteção de dados)\n\
- **Pontos de Atenção Críticos:** Um resumo dos 2-3 pontos que exigem maior atenção imediata.\n\n\
Se não encontrar riscos em uma categoria, indique \"Nenhum risco aparente encontrado.\".\n\
Seja objetivo e cite trechos do contrato quando relevante.\n\n\
Contrato para Análise:\n---\n{texto_contrato}\n---\n\
Relatório de Análise de Riscos:";

const EVENTS_PROMPT: &str = "Analise o texto do contrato abaixo, originado do arquivo \
'{nome_arquivo}'.\n\
Sua tarefa é identificar e listar TODOS os eventos, prazos, vencimentos ou datas importantes \
mencionados.\n\
Para cada evento, extraia uma descrição clara, a data (se especificada) e o trecho relevante \
do texto.\n\
{format_instructions}\n\n\
Texto do Contrato:\n---\n{texto_contrato}\n---";

const CONFORMITY_PROMPT: &str = "Você é um auditor de conformidade. Sua tarefa é comparar dois \
documentos e gerar um relatório de conformidade.\n\
O Documento de Referência é o padrão a ser seguido.\n\
O Documento em Análise deve ser comparado com o de referência.\n\n\
Relatório de Conformidade:\n\
- Documento de Referência: {nome_referencia}\n\
- Documento em Análise: {nome_analisado}\n\n\
1. **Resumo da Comparação:** Faça um breve resumo das semelhanças e diferenças gerais.\n\
2. **Pontos de Conformidade:** Liste as principais cláusulas ou termos em que o \
'{nome_analisado}' está em conformidade com o '{nome_referencia}'.\n\
3. **Pontos de Divergência (Desvios):** Liste as principais cláusulas ou termos onde o \
'{nome_analisado}' diverge do '{nome_referencia}'. Seja específico e, se possível, cite os \
trechos.\n\
4. **Recomendações:** Com base nos desvios, sugira ações para ajustar o '{nome_analisado}' \
para que fique em conformidade com o documento de referência.\n\n\
DOCUMENTO DE REFERÊNCIA:\n---\n{texto_referencia}\n---\n\n\
DOCUMENTO EM ANÁLISE:\n---\n{texto_analisado}\n---\n\n\
Elabore o Relatório de Conformidade em formato Markdown:";

const ANOMALY_PROMPT: &str = "Você é um analista de dados financeiros sênior. Sua tarefa é \
analisar o conjunto de dados de contratos abaixo e identificar anomalias, outliers ou padrões \
incomuns.\n\
Procure por:\n\
- Taxas de juros que são muito mais altas ou baixas que a média.\n\
- Prazos de contrato que são excessivamente longos ou curtos.\n\
- Valores principais que se desviam significativamente dos outros.\n\
- Contratos do mesmo banco com condições muito diferentes.\n\
- Contratos sem valores numéricos claros onde outros têm.\n\n\
Liste cada anomalia encontrada como um item de uma lista, explicando por que você a considera \
uma anomalia. Se nenhum padrão incomum for encontrado, retorne uma lista com o item \
\"Nenhuma anomalia significativa foi detectada.\".\n\n\
Dados dos Contratos:\n{dados_contratos}\n\n\
Análise de Anomalias (formato de lista):";

const QA_PROMPT: &str = "Use os seguintes trechos de contexto para responder à pergunta no \
final.\n\
A sua tarefa é sintetizar a informação e fornecer uma resposta precisa e direta.\n\
Se não souber a resposta ou se a informação não estiver no contexto, diga apenas que não \
encontrou a informação, não tente inventar uma resposta.\n\
Responda sempre em português do Brasil.\n\n\
Contexto:\n{context}\n\n\
Pergunta:\n{question}\n\n\
Resposta Útil:";

/// Structured extraction results for one session, one entry per file that
/// produced a parseable record.
#[derive(Debug, Clone)]
pub struct ExtractionBatch {
    pub records: Vec<ContractInfo>,
    pub failures: Vec<ItemFailure>,
}

/// Aggregated deadline-extraction results across a session's files.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<ExtractedEvent>,
    pub failures: Vec<ItemFailure>,
}

/// An answer with the fragments it was conditioned on, for citation display.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedFragment>,
}

fn non_empty(reply: String, context: &str) -> Result<String, ServiceError> {
    if reply.trim().is_empty() {
        Err(ServiceError::EmptyReply(context.to_string()))
    } else {
        Ok(reply)
    }
}

/// Trims a model reply down to its JSON object: code fences are stripped,
/// and anything before the first `{` or after the last `}` is dropped.
fn json_block(reply: &str) -> &str {
    let start = reply.find('{');
    let end = reply.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply.trim(),
    }
}

/// Extracts a [`ContractInfo`] record per session file. Files whose text
/// cannot be reassembled or whose model reply does not parse against the
/// schema become failures; the batch never aborts.
pub async fn extract_contract_data(
    session: &SessionState,
    model: &dyn TextModel,
) -> ExtractionBatch {
    let mut records = Vec::new();
    let mut failures = Vec::new();

    for name in &session.file_names {
        let Some(full_text) = session.full_text(name) else {
            failures.push(ItemFailure {
                source_file: name.clone(),
                reason: "no text reconstructed from the index".to_string(),
            });
            continue;
        };

        let prompt = EXTRACTION_PROMPT
            .replace("{texto_documento}", &full_text)
            .replace("{nome_arquivo}", name)
            .replace("{format_instructions}", CONTRACT_INFO_FORMAT);

        match model.generate(&prompt).await {
            Ok(reply) => match serde_json::from_str::<ContractInfo>(json_block(&reply)) {
                Ok(mut record) => {
                    // The model is free to get this wrong; the caller knows
                    // which file the text came from.
                    record.source_file = name.clone();
                    records.push(record);
                }
                Err(error) => failures.push(ItemFailure {
                    source_file: name.clone(),
                    reason: format!("reply did not match the schema: {error}"),
                }),
            },
            Err(error) => failures.push(ItemFailure {
                source_file: name.clone(),
                reason: error.to_string(),
            }),
        }
    }

    ExtractionBatch { records, failures }
}

/// Executive summary of one file's full text.
pub async fn executive_summary(
    session: &SessionState,
    source_file: &str,
    model: &dyn TextModel,
) -> Result<String, ServiceError> {
    let full_text = session.full_text(source_file).ok_or_else(|| {
        ServiceError::InvalidInput(format!("no text available for '{source_file}'"))
    })?;

    let prompt = SUMMARY_PROMPT
        .replace("{nome_arquivo}", source_file)
        .replace("{texto_contrato}", &full_text);

    non_empty(model.generate(&prompt).await?, "executive summary")
}

/// Markdown risk report over one file's full text.
pub async fn risk_analysis(
    session: &SessionState,
    source_file: &str,
    model: &dyn TextModel,
) -> Result<String, ServiceError> {
    let full_text = session.full_text(source_file).ok_or_else(|| {
        ServiceError::InvalidInput(format!("no text available for '{source_file}'"))
    })?;

    let prompt = RISK_PROMPT
        .replace("{nome_arquivo}", source_file)
        .replace("{texto_contrato}", &full_text);

    non_empty(model.generate(&prompt).await?, "risk analysis")
}

/// Extracts contractual events and deadlines from every session file,
/// flattened into one list. Per-file failures are collected, not fatal.
pub async fn extract_events(session: &SessionState, model: &dyn TextModel) -> EventBatch {
    let mut events = Vec::new();
    let mut failures = Vec::new();

    for name in &session.file_names {
        let Some(full_text) = session.full_text(name) else {
            failures.push(ItemFailure {
                source_file: name.clone(),
                reason: "no text reconstructed from the index".to_string(),
            });
            continue;
        };

        let prompt = EVENTS_PROMPT
            .replace("{nome_arquivo}", name)
            .replace("{format_instructions}", EVENT_LIST_FORMAT)
            .replace("{texto_contrato}", &full_text);

        match model.generate(&prompt).await {
            Ok(reply) => match serde_json::from_str::<EventList>(json_block(&reply)) {
                Ok(list) => {
                    for event in list.events {
                        events.push(ExtractedEvent {
                            source_file: name.clone(),
                            description: event.description,
                            date: event.date,
                            excerpt: event.excerpt,
                        });
                    }
                }
                Err(error) => failures.push(ItemFailure {
                    source_file: name.clone(),
                    reason: format!("reply did not match the schema: {error}"),
                }),
            },
            Err(error) => failures.push(ItemFailure {
                source_file: name.clone(),
                reason: error.to_string(),
            }),
        }
    }

    EventBatch { events, failures }
}

/// Conformity report comparing an analyzed document against a reference.
/// Which file plays which role changes the baseline, not whether the call
/// succeeds.
pub async fn conformity_check(
    session: &SessionState,
    reference_file: &str,
    analyzed_file: &str,
    model: &dyn TextModel,
) -> Result<String, ServiceError> {
    let reference_text = session.full_text(reference_file).ok_or_else(|| {
        ServiceError::InvalidInput(format!("no text available for '{reference_file}'"))
    })?;
    let analyzed_text = session.full_text(analyzed_file).ok_or_else(|| {
        ServiceError::InvalidInput(format!("no text available for '{analyzed_file}'"))
    })?;

    let prompt = CONFORMITY_PROMPT
        .replace("{nome_referencia}", reference_file)
        .replace("{nome_analisado}", analyzed_file)
        .replace("{texto_referencia}", &reference_text)
        .replace("{texto_analisado}", &analyzed_text);

    non_empty(model.generate(&prompt).await?, "conformity report")
}

fn markdown_cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "—".to_string())
}

fn markdown_number<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|number| number.to_string())
        .unwrap_or_else(|| "—".to_string())
}

/// Renders extracted records as the Markdown table the anomaly prompt
/// consumes.
fn records_table(records: &[ContractInfo]) -> String {
    let mut table = String::from(
        "| arquivo_fonte | nome_banco_emissor | valor_principal_numerico | prazo_total_meses \
         | taxa_juros_anual_numerica | possui_clausula_rescisao_multa |\n\
         |---|---|---|---|---|---|\n",
    );

    for record in records {
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            record.source_file,
            markdown_cell(&record.issuing_bank),
            markdown_number(&record.principal_amount),
            markdown_number(&record.term_months),
            markdown_number(&record.annual_interest_rate),
            markdown_cell(&record.termination_penalty),
        ));
    }

    table
}

/// Flags anomalies across a set of extracted records. Empty input
/// short-circuits without a model call; the reply is filtered down to its
/// `- ` list items.
pub async fn detect_anomalies(
    records: &[ContractInfo],
    model: &dyn TextModel,
) -> Result<Vec<String>, ServiceError> {
    if records.is_empty() {
        return Ok(vec![
            "Nenhum dado de contrato disponível, nenhuma anomalia para detectar.".to_string(),
        ]);
    }

    let prompt = ANOMALY_PROMPT.replace("{dados_contratos}", &records_table(records));
    let reply = model.generate(&prompt).await?;

    let anomalies: Vec<String> = reply
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("- "))
        .map(|line| line.trim_start_matches("- ").to_string())
        .collect();

    if anomalies.is_empty() {
        Ok(vec![NO_ANOMALIES.to_string()])
    } else {
        Ok(anomalies)
    }
}

/// Retrieval-augmented question answering: embed the question, retrieve the
/// top-k fragments, and ask the model to answer from that context only. The
/// "don't fabricate" rule lives in the prompt, not in any enforcement.
pub async fn answer_question(
    session: &SessionState,
    question: &str,
    model: &dyn TextModel,
    embedder: &dyn Embedder,
) -> Result<Answer, ServiceError> {
    if question.trim().is_empty() {
        return Err(ServiceError::InvalidInput("question is empty".to_string()));
    }

    let query_vector = embedder.embed(question).await?;
    if query_vector.len() != session.index.dimensions() {
        return Err(ServiceError::InvalidInput(format!(
            "query embedding has {} dimensions, index was built with {}",
            query_vector.len(),
            session.index.dimensions()
        )));
    }
    let sources = session.index.search(&query_vector, ANSWER_TOP_K);

    let context = sources
        .iter()
        .map(|hit| {
            format!(
                "[{} | página {}]\n{}",
                hit.fragment.source, hit.fragment.page, hit.fragment.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = QA_PROMPT
        .replace("{context}", &context)
        .replace("{question}", question);

    let text = non_empty(model.generate(&prompt).await?, "question answering")?;
    Ok(Answer { text, sources })
}
