//! Built-in content: quiz banks, matching decks and simulation scenarios.
//! The app is playable without any TOML bank.

use crate::domain::{Difficulty, MatchRole, MatchingItem, Question, SimulationParameter};
use crate::matching::MatchingDeck;
use crate::simulation::{SimulationKind, SimulationScenario, TargetRange};

fn q(id: &str, difficulty: Difficulty, prompt: &str, options: &[&str], correct: usize, explanation: &str) -> Question {
  Question {
    id: id.into(),
    difficulty,
    prompt: prompt.into(),
    options: options.iter().map(|o| o.to_string()).collect(),
    correct_option: correct,
    explanation: explanation.into(),
  }
}

/// Interpreting p-values, one question per level.
pub fn p_value_questions() -> Vec<Question> {
  vec![
    q(
      "pvalue-1",
      Difficulty::VeryEasy,
      "Você testou com 20 amigos se beber água antes do treino melhora o desempenho. O grupo que bebeu água se saiu melhor, com p = 0,01. O que significa p = 0,01?",
      &[
        "1% das pessoas se beneficiam da água",
        "A água funciona 1% melhor",
        "Se a água não funcionasse, haveria apenas 1% de chance de ver essa diferença",
        "99% das pessoas devem beber água antes do treino",
      ],
      2,
      "Se a água não fizesse diferença nenhuma, haveria só 1% de chance de observar uma diferença tão grande entre os grupos.",
    ),
    q(
      "pvalue-2",
      Difficulty::Easy,
      "Um estudo comparou duas dietas para perda de peso e obteve p = 0,02. O que isso significa?",
      &[
        "Há 2% de chance de que a Dieta A funcione",
        "Se não houvesse diferença real, haveria 2% de chance de observar esta diferença ou maior",
        "A Dieta A é 2% melhor que a Dieta B",
        "98% das pessoas vão perder peso com a Dieta A",
      ],
      1,
      "O valor-p é a probabilidade de dados tão extremos quanto os observados supondo que a hipótese nula é verdadeira.",
    ),
    q(
      "pvalue-3",
      Difficulty::Medium,
      "Suplementação proteica em atletas: ganho médio de 1,2 kg, p = 0,08, IC 95% = [-0,1; 2,5] kg. Como interpretar?",
      &[
        "O suplemento não funciona porque p > 0,05",
        "Não há evidência estatística significativa, mas o efeito pode ser clinicamente relevante",
        "O resultado é definitivamente negativo",
        "Devemos ignorar este estudo",
      ],
      1,
      "p = 0,08 não é significativo, mas 1,2 kg pode importar para atletas; o IC sugere benefício que um estudo maior poderia detectar.",
    ),
    q(
      "pvalue-4",
      Difficulty::Hard,
      "Meta-análise sobre ômega-3 e cognição: p = 0,03, efeito = 0,12, I² = 78% e viés de publicação detectado. Qual a interpretação mais apropriada?",
      &[
        "O ômega-3 definitivamente melhora a cognição (p < 0,05)",
        "Apesar da significância estatística, a alta heterogeneidade e o viés de publicação limitam a confiabilidade",
        "O resultado é válido porque o IC não inclui zero",
        "Devemos aceitar o resultado porque é uma meta-análise",
      ],
      1,
      "Heterogeneidade alta e viés de publicação enfraquecem a conclusão mesmo com p < 0,05.",
    ),
    q(
      "pvalue-5",
      Difficulty::VeryHard,
      "Foram testados 20 suplementos; um deles teve p = 0,02. Com correção de Bonferroni, α ajustado = 0,0025. Qual a interpretação correta?",
      &[
        "O resultado é significativo porque p = 0,02 < 0,05",
        "O resultado não é significativo após correção (p = 0,02 > 0,0025)",
        "Devemos ignorar a correção porque encontramos um resultado positivo",
        "A correção de Bonferroni é muito conservadora, então o resultado é válido",
      ],
      1,
      "Com 20 testes a α = 0,05 espera-se um falso positivo; 0,05/20 = 0,0025 e 0,02 > 0,0025.",
    ),
  ]
}

/// Basic probability with nutrition examples.
pub fn probability_questions() -> Vec<Question> {
  vec![
    q(
      "prob-1",
      Difficulty::VeryEasy,
      "João vai jogar uma moeda honesta uma vez. Qual a probabilidade de dar CARA?",
      &[
        "50% (ou 0,5) - porque há 2 possibilidades iguais",
        "25% (ou 0,25) - porque cara é menos provável",
        "75% (ou 0,75) - porque cara é mais provável",
        "100% (ou 1,0) - porque sempre dá cara",
      ],
      0,
      "Dois resultados igualmente prováveis: cada um tem 1/2 = 50% de chance.",
    ),
    q(
      "prob-2",
      Difficulty::Easy,
      "Um dado de 6 faces sorteia a fruta recomendada: Maçã, Banana, Laranja, Uva, Pêra, Manga. Qual a probabilidade de sair uma fruta cítrica?",
      &[
        "1/6 ≈ 16,7% - porque só há 1 fruta cítrica entre 6 opções",
        "2/6 ≈ 33,3% - porque cítrica é mais comum",
        "3/6 = 50% - porque metade das frutas são cítricas",
        "1/2 = 50% - porque ou sai ou não sai",
      ],
      0,
      "Só a laranja é cítrica: P = 1/6.",
    ),
    q(
      "prob-3",
      Difficulty::Medium,
      "Na academia, 60% dos alunos são mulheres; 80% delas e 90% dos homens fazem musculação. Alguém está fazendo musculação: qual a probabilidade de ser mulher?",
      &[
        "Cerca de 57%",
        "60% - porque 60% dos alunos são mulheres",
        "80% - porque 80% das mulheres fazem musculação",
        "50% - porque tanto homens quanto mulheres fazem musculação",
      ],
      0,
      "0,6 × 0,8 = 0,48; 0,4 × 0,9 = 0,36; 0,48 / 0,84 ≈ 57%.",
    ),
  ]
}

fn item(id: &str, role: MatchRole, group: &str, text: &str, explanation: &str, analogy: Option<&str>) -> MatchingItem {
  MatchingItem {
    id: id.into(),
    role,
    group_key: group.into(),
    text: text.into(),
    explanation: explanation.into(),
    analogy: analogy.map(str::to_string),
  }
}

pub fn matching_decks() -> Vec<MatchingDeck> {
  use MatchRole::{Concept, Example};
  vec![
    MatchingDeck {
      id: "everyday-concepts".into(),
      level: Difficulty::VeryEasy,
      title: "Conceitos Básicos do Dia a Dia".into(),
      instruction: "Conecte cada conceito estatístico com uma situação da vida real".into(),
      items: vec![
        item("mean-concept", Concept, "mean", "Média", "Soma de tudo dividida pelo número de itens.", Some("Como calcular seu gasto médio por dia")),
        item("mean-example", Example, "mean", "Você gastou R$ 20, R$ 30 e R$ 40 em três dias: média de R$ 30 por dia.", "20 + 30 + 40 = 90; 90 / 3 = 30.", None),
        item("correlation-concept", Concept, "correlation", "Correlação", "Duas coisas que tendem a variar juntas.", Some("Como notar que duas coisas sempre andam juntas")),
        item("correlation-example", Example, "correlation", "Quanto mais você estuda, melhor sua nota tende a ser.", "Mais estudo costuma vir com notas melhores.", None),
        item("sample-concept", Concept, "sample", "Amostra", "Um pedaço de um grupo maior.", Some("Como provar uma colherada de sopa")),
        item("sample-example", Example, "sample", "Pesquisar 100 pessoas para saber a opinião de toda a cidade.", "Cem pessoas bem escolhidas representam a população.", None),
      ],
    },
    MatchingDeck {
      id: "choosing-tests".into(),
      level: Difficulty::Easy,
      title: "Identificando Testes Estatísticos".into(),
      instruction: "Conecte cada medida ou teste com a situação em que você o usaria".into(),
      items: vec![
        item("ttest-concept", Concept, "ttest", "Teste t", "Compara as médias de dois grupos.", Some("Comparar duas marcas de café")),
        item("ttest-example", Example, "ttest", "Comparar se um suplemento aumenta a força muscular versus placebo.", "A diferença entre grupos é real ou acaso?", None),
        item("kappa-concept", Concept, "kappa", "Coeficiente Kappa", "Concordância entre avaliadores além do acaso.", Some("Dois juízes de culinária dando notas")),
        item("kappa-example", Example, "kappa", "Dois nutricionistas avaliam se pacientes estão desnutridos.", "Eles concordam mais do que por sorte?", None),
        item("median-concept", Concept, "median", "Mediana", "Valor do meio de uma lista ordenada.", None),
        item("median-example", Example, "median", "Renda de um bairro onde poucos moradores ganham muito mais que os outros.", "Valores extremos não deslocam a mediana.", None),
        item("sd-concept", Concept, "sd", "Desvio padrão", "Quanto os valores se espalham em torno da média.", None),
        item("sd-example", Example, "sd", "Pesos de recém-nascidos variando pouco em torno de 3,2 kg.", "Pouca dispersão significa desvio padrão pequeno.", None),
        item("sd-example-2", Example, "sd", "Tempo de preparo de refeições que às vezes leva 10 e às vezes 60 minutos.", "Muita dispersão significa desvio padrão grande.", None),
      ],
    },
  ]
}

fn param(id: &str, label: &str, min: f64, max: f64, step: f64, default_value: f64, unit: Option<&str>, description: &str) -> SimulationParameter {
  SimulationParameter {
    id: id.into(),
    label: label.into(),
    min,
    max,
    step,
    default_value,
    unit: unit.map(str::to_string),
    description: description.into(),
  }
}

pub fn simulation_scenarios() -> Vec<SimulationScenario> {
  vec![
    SimulationScenario {
      id: "coffee-energy".into(),
      level: Difficulty::VeryEasy,
      title: "Café e Energia".into(),
      instruction: "Ajuste quantas xícaras de café cada pessoa toma e veja como a energia média muda".into(),
      concept: "Relação causa e efeito com variabilidade".into(),
      kind: SimulationKind::CoffeeEnergy,
      parameters: vec![
        param("cups", "Xícaras de café", 0.0, 5.0, 1.0, 2.0, Some("xícaras"), "Quantidade de café por pessoa"),
        param("people", "Pessoas", 5.0, 50.0, 5.0, 20.0, Some("pessoas"), "Tamanho do grupo simulado"),
      ],
      target: Some(TargetRange { min: 6.0, max: 8.0, label: "Energia média entre 6 e 8".into() }),
    },
    SimulationScenario {
      id: "exercise-heart-rate".into(),
      level: Difficulty::Easy,
      title: "Exercício e Frequência Cardíaca".into(),
      instruction: "Varie a intensidade do treino e observe a frequência cardíaca dos atletas".into(),
      concept: "Efeito proporcional com ruído".into(),
      kind: SimulationKind::ExerciseHeartRate,
      parameters: vec![
        param("intensity", "Intensidade", 20.0, 90.0, 10.0, 50.0, Some("%"), "Esforço em relação ao máximo"),
        param("athletes", "Atletas", 10.0, 40.0, 5.0, 20.0, Some("atletas"), "Número de atletas simulados"),
      ],
      target: Some(TargetRange { min: 120.0, max: 160.0, label: "Zona aeróbica (120 a 160 bpm)".into() }),
    },
    SimulationScenario {
      id: "height-weight".into(),
      level: Difficulty::Medium,
      title: "Simulação de Correlação - Altura vs Peso".into(),
      instruction: "Mude a força da correlação e veja o espalhamento dos pesos".into(),
      concept: "Correlação e dispersão".into(),
      kind: SimulationKind::HeightWeight,
      parameters: vec![
        param("correlation", "Correlação", -1.0, 1.0, 0.1, 0.5, None, "Força da relação entre altura e peso"),
        param("sample_size", "Tamanho da amostra", 10.0, 100.0, 10.0, 30.0, Some("pessoas"), "Pessoas na amostra"),
      ],
      target: None,
    },
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decks_build_into_valid_sets() {
    for deck in matching_decks() {
      let set = deck.build().unwrap();
      assert!(set.concepts().count() >= 3, "{}", deck.id);
    }
  }

  #[test]
  fn question_answers_point_at_an_option() {
    for question in p_value_questions().into_iter().chain(probability_questions()) {
      assert!(question.correct_option < question.options.len(), "{}", question.id);
    }
  }

  #[test]
  fn p_value_quiz_covers_every_level() {
    let levels: Vec<Difficulty> = p_value_questions().iter().map(|q| q.difficulty).collect();
    assert_eq!(levels, Difficulty::ALL.to_vec());
  }
}
